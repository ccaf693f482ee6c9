use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    let unit = unit_str.trim();
    match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a JSON report to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Load-generation engine for the concert reservation service",
    long_about = "stampede drives concurrent virtual users through the concert reservation flow (queue token, status polling, seat reservation, payment), aggregates latency/count/rate metrics, and judges the run against configured thresholds.\n\nA YAML run plan defines scenarios (ramping stages or a shared iteration pool) and thresholds; without one, the built-in plan reproduces the standard load and spike shapes.",
    after_help = "Examples:\n  stampede run --base-url http://localhost:8080\n  stampede run plan.yaml --output json\n  stampede run --vus 100 --iterations 200\n  BASE_URL=http://staging:8080 stampede run plan.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the target service
    #[command(
        long_about = "Run the scenarios from the plan (or the built-in default plan) against the target service.\n\nCLI flags override values from the plan; --vus/--iterations/--duration collapse the plan into a single shared-pool scenario."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a YAML run plan (omit for the built-in default plan)
    pub plan: Option<PathBuf>,

    /// Base URL of the service under test
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Concert every issued token targets
    #[arg(long, env = "CONCERT_ID")]
    pub concert_id: Option<u64>,

    /// Override the VU pool size (collapses the plan to one shared-pool scenario)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Override the total iteration budget
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Override the hard wall-clock cap (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Where the JSON report artifact is written
    #[arg(long, default_value = "summary.json")]
    pub summary_out: PathBuf,

    /// Skip writing the JSON report artifact
    #[arg(long)]
    pub no_summary_file: bool,
}

impl RunArgs {
    pub fn has_pool_overrides(&self) -> bool {
        self.vus.is_some() || self.iterations.is_some() || self.duration.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "stampede",
            "run",
            "plan.yaml",
            "--base-url",
            "http://localhost:9999",
            "--vus",
            "100",
            "--iterations",
            "200",
            "--duration",
            "2m",
            "--output",
            "json",
            "--no-summary-file",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.plan, Some(PathBuf::from("plan.yaml")));
        assert_eq!(args.base_url, Some("http://localhost:9999".to_string()));
        assert_eq!(args.vus, Some(100));
        assert_eq!(args.iterations, Some(200));
        assert_eq!(args.duration, Some(Duration::from_secs(120)));
        assert!(args.no_summary_file);
        assert!(args.has_pool_overrides());
        assert!(matches!(args.output, OutputFormat::Json));
    }

    #[test]
    fn cli_run_defaults() {
        let cli = Cli::try_parse_from(["stampede", "run"])
            .unwrap_or_else(|err| panic!("failed to parse args: {err}"));

        let Command::Run(args) = cli.command;
        assert_eq!(args.plan, None);
        assert_eq!(args.summary_out, PathBuf::from("summary.json"));
        assert!(!args.has_pool_overrides());
    }
}

//! CLI argument definitions

use std::time::Duration;

use clap::Parser;

use crate::server::ServerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "scopewatch",
    about = "Live task-tree inspector for a structured-concurrency scheduler",
    after_help = "\
EXAMPLES:
    scopewatch                               Serve the demo workload on 127.0.0.1:5000
    scopewatch --port 8080 --duration 60     Serve on port 8080 for one minute
    curl http://127.0.0.1:5000/tasks.json    Fetch the current task tree"
)]
pub struct Args {
    /// Address to bind the query surface to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the query surface to
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    /// Scheduler loop interval in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.host.clone(), self.port)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// `None` means run until interrupted
    pub fn run_for(&self) -> Option<Duration> {
        (self.duration > 0).then_some(Duration::from_secs(self.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["scopewatch"]).unwrap();
        assert_eq!(args.server_config(), ServerConfig::default());
        assert_eq!(args.tick(), Duration::from_millis(100));
        assert_eq!(args.run_for(), None);
        assert!(!args.quiet);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "scopewatch", "--host", "0.0.0.0", "-p", "8080", "--duration", "5", "-q",
        ])
        .unwrap();
        assert_eq!(args.server_config().bind_addr(), "0.0.0.0:8080");
        assert_eq!(args.run_for(), Some(Duration::from_secs(5)));
        assert!(args.quiet);
    }

    #[test]
    fn test_zero_tick_rejected() {
        assert!(Args::try_parse_from(["scopewatch", "--tick-ms", "0"]).is_err());
    }
}

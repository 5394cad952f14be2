use clap::Parser;

/// Server command line. Flags override the environment-derived configuration.
#[derive(Debug, Parser)]
#[command(name = "memoires-api")]
#[command(about = "Memoires API - collective memories backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, env = "HOST", help = "Address to bind")]
    pub host: Option<String>,

    #[arg(long, help = "Port to listen on (defaults to MEMOIRES_API_PORT / PORT / 3000)")]
    pub port: Option<u16>,

    #[arg(long, help = "Create the Postgres schema before serving")]
    pub migrate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from(["memoires-api", "--port", "8080", "--migrate"]);
        assert_eq!(cli.port, Some(8080));
        assert!(cli.migrate);
    }
}

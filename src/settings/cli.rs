use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "warden", about = "Credential service over gRPC and HTTP/JSON")]
pub struct Cli {
    /// Path to a settings file; defaults to settings/dev.toml or settings/release.toml.
    #[arg(long)]
    pub settings: Option<String>,
}

use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = atelier_chat::Args::parse();

	atelier_chat::run(args).await
}

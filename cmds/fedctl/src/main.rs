use anyhow::Result;
use clap::{Parser, Subcommand};
use fedctl::{
	commands::{self, util::BrokenPipeGuard},
	telemetry,
};

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "fedctl")]
#[command(about = "Read and watch resources across a control plane and its member clusters", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Display one or many resources in the control plane and member clusters
	Get(commands::get::GetArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let log_level = match &cli.command {
		Commands::Get(args) => args.log_level,
	};
	let _telemetry = telemetry::init(log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Get(args) => commands::get::run(args, stdout),
	}
}

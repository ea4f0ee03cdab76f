use crate::demo::{print_plan, run_demo, run_screen, DemoArgs, ScreenArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use tenant_screening::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Tenant Screening Orchestrator",
    about = "Run and demonstrate the tenant screening stage orchestrator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Screen a single applicant from a JSON submission file
    Screen(ScreenArgs),
    /// Screen the bundled sample applicants and print their outcomes
    Demo(DemoArgs),
    /// Print the standard pipeline's execution waves
    Plan,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Screen(args) => run_screen(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Plan => print_plan(),
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rowkeeper")]
#[command(about = "Shopping assistant client - keeps every purchase intent's offers straight")]
struct Cli {
  /// Shopping backend URL (or use ROWKEEPER_SERVER_URL env var)
  #[arg(long, env = "ROWKEEPER_SERVER_URL", global = true)]
  server: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List your rows
  Rows,
  /// Send a message to the shopping agent
  Chat {
    /// What you're looking for, or how to refine it
    message: String,
    /// Row the message refers to (defaults to the first open row)
    #[arg(short, long)]
    row: Option<i64>,
    /// How eagerly unrelated messages start a new row (0-100)
    #[arg(short, long)]
    aggressiveness: Option<i32>,
  },
  /// Search a row's providers again
  Search {
    row: i64,
    /// Only search these providers
    #[arg(short, long = "provider")]
    providers: Vec<String>,
  },
  /// Select an offer (or a vendor's quote) for a row
  Select {
    row: i64,
    /// Offer key as shown by `rowkeeper search`
    offer: String,
    #[arg(long)]
    quote: bool,
  },
  /// Like or unlike an offer
  Like { row: i64, offer: String },
  /// Leave a comment on an offer
  Comment { row: i64, offer: String, body: String },
  /// Answer one of a row's choice factors
  Answer {
    row: i64,
    name: String,
    /// JSON value, or plain text
    value: String,
  },
  /// Archive a row (Ctrl-C during the undo window keeps it)
  Archive { row: i64 },
}

#[cfg(not(tarpaulin_include))] // Skip coverage - CLI entry point
#[tokio::main]
async fn main() -> Result<()> {
  bentley::init();
  let cli = Cli::parse();
  let context = commands::Context::new(cli.server)?;

  match cli.command {
    Commands::Rows => commands::rows::handle(&context).await,
    Commands::Chat { message, row, aggressiveness } => {
      commands::chat::handle(&context, &message, row, aggressiveness).await
    }
    Commands::Search { row, providers } => commands::search::handle(&context, row, providers).await,
    Commands::Select { row, offer, quote } => {
      commands::offers::select(&context, row, &offer, quote).await
    }
    Commands::Like { row, offer } => commands::offers::like(&context, row, &offer).await,
    Commands::Comment { row, offer, body } => {
      commands::offers::comment(&context, row, &offer, &body).await
    }
    Commands::Answer { row, name, value } => {
      commands::answer::handle(&context, row, &name, &value).await
    }
    Commands::Archive { row } => commands::archive::handle(&context, row).await,
  }
}

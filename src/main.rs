use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use solana_sdk::signature::{read_keypair_file, Signer};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use story_transfer::characters::{self, CharacterSelection};
use story_transfer::config::{self, parse_address, AppConfig, RawConfig};
use story_transfer::status::{LogSink, StatusSink, StoryStatus, SubmissionStatus};
use story_transfer::story::{HttpStoryClient, StoryService};
use story_transfer::submitter::{SubmitterOptions, TransferSubmitter};
use story_transfer::viewer::{PanelViewer, PollPolicy};
use story_transfer::wallet::{
    KeypairWallet, Reconnector, Wallet, WalletEvent, WalletEventHandler,
};
use story_transfer::{RpcLedger, StoryPurchase};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RPC endpoint URL
    #[arg(long, env = "STORY_RPC_URL", global = true)]
    rpc_url: Option<String>,

    /// Commitment level: processed, confirmed or finalized
    #[arg(long, env = "STORY_COMMITMENT", global = true)]
    commitment: Option<String>,

    /// Wallet that receives the payment
    #[arg(long, env = "STORY_RECIPIENT", global = true)]
    recipient: Option<String>,

    /// Mint of the payment token
    #[arg(long, env = "STORY_MINT", global = true)]
    mint: Option<String>,

    /// Whole tokens per story (default: 100000)
    #[arg(long, env = "STORY_AMOUNT", global = true)]
    amount: Option<u64>,

    /// Story service root URL
    #[arg(long, env = "STORY_API_URL", global = true)]
    api_url: Option<String>,

    /// Story service API key
    #[arg(long, env = "STORY_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Image URL template containing {wallet}
    #[arg(long, env = "STORY_IMAGE_URL", global = true)]
    image_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the characters a story can be built from
    Characters,

    /// Pay for a story and submit the selected characters
    Buy {
        /// Keypair file of the paying wallet
        #[arg(short, long, env = "STORY_KEYPAIR")]
        keypair: PathBuf,

        /// Character to include (repeat up to 6 times)
        #[arg(short, long = "character", required = true)]
        characters: Vec<String>,
    },

    /// Ask for the next panel of an existing story
    NextPanel {
        /// Wallet address the story belongs to
        #[arg(short, long)]
        wallet: String,
    },

    /// Wait for the generated panel and download it
    View {
        /// Wallet address the story belongs to
        #[arg(short, long)]
        wallet: String,

        /// Directory the image and text are written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Maximum number of polls before giving up
        #[arg(long, default_value_t = 30)]
        attempts: u32,
    },
}

impl Args {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            rpc_url: self.rpc_url.clone(),
            commitment: self.commitment.clone(),
            recipient: self.recipient.clone(),
            mint: self.mint.clone(),
            amount: self.amount,
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            image_url: self.image_url.clone(),
        }
    }

    fn story_client(&self) -> Result<HttpStoryClient> {
        let story = config::story_config(
            self.api_url.clone(),
            self.api_key.clone(),
            self.image_url.clone(),
        )?;
        Ok(HttpStoryClient::new(
            &story.api_url,
            &story.api_key,
            &story.image_url,
        ))
    }
}

/// Prints progress the way a user watching the terminal expects it.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn transfer(&self, status: &SubmissionStatus) {
        LogSink.transfer(status);
        let marker = match status {
            SubmissionStatus::Idle => "💤",
            SubmissionStatus::Preparing => "🔧",
            SubmissionStatus::CreatingRecipientAccount => "🏗️",
            SubmissionStatus::AwaitingSignature => "✍️",
            SubmissionStatus::Submitted(_) => "📡",
            SubmissionStatus::Confirming => "⏳",
            SubmissionStatus::Confirmed(_) => "✅",
            SubmissionStatus::Failed(_) => "❌",
        };
        match status {
            SubmissionStatus::Failed(_) => eprintln!("{} {}", marker, status),
            _ => println!("{} {}", marker, status),
        }
    }

    fn story(&self, status: &StoryStatus) {
        LogSink.story(status);
        match status {
            StoryStatus::Failed(_) | StoryStatus::PanelRequestFailed(_) => {
                eprintln!("⚠️ {}", status)
            }
            _ => println!("📖 {}", status),
        }
    }
}

struct ConsoleEvents;

impl WalletEventHandler for ConsoleEvents {
    fn on_event(&self, event: &WalletEvent) {
        match event {
            WalletEvent::Connected(key) => println!("🔌 Wallet connected: {}", key),
            WalletEvent::Disconnected => println!("🔌 Wallet disconnected."),
            WalletEvent::AccountChanged(Some(key)) => println!("🔀 Switched to account {}", key),
            WalletEvent::AccountChanged(None) => println!("🔀 Account changed, reconnecting..."),
        }
    }
}

fn list_characters() {
    println!("🎭 Available characters (pick up to {}):", characters::MAX_SELECTED);
    for name in characters::ROSTER {
        println!("  • {}", name);
    }
}

async fn buy(args: &Args, keypair_path: &Path, names: &[String]) -> Result<()> {
    let config = AppConfig::from_raw(args.raw_config())?;
    let selection = CharacterSelection::from_names(names)?;

    let keypair = read_keypair_file(keypair_path)
        .map_err(|e| anyhow!("Failed to read keypair {}: {}", keypair_path.display(), e))?;
    println!("💰 Paying wallet: {}", keypair.pubkey());
    println!("🌐 RPC endpoint: {}", config.rpc_url);
    println!("🎭 Characters: {}", selection.names().join(", "));

    let ledger = Arc::new(RpcLedger::new(&config.rpc_url, config.commitment));
    let wallet = Arc::new(KeypairWallet::new(keypair, ledger.client()));
    wallet.events().subscribe(Arc::new(ConsoleEvents));
    wallet.events().subscribe(Arc::new(Reconnector::new(&wallet)));
    wallet.connect().await.context("Failed to connect wallet")?;

    println!(
        "💸 Sending {} tokens of {} to {}",
        config.amount, config.mint, config.recipient
    );

    let submitter = Arc::new(TransferSubmitter::new(
        ledger.clone(),
        SubmitterOptions::default(),
    ));
    let story: Arc<dyn StoryService> = Arc::new(HttpStoryClient::new(
        &config.story.api_url,
        &config.story.api_key,
        &config.story.image_url,
    ));
    let purchase = StoryPurchase::new(submitter, story, config.transfer_request());

    let receipt = purchase
        .purchase(wallet.as_ref(), &selection, &ConsoleSink)
        .await;
    wallet.disconnect().await?;
    let receipt = receipt?;

    println!(
        "🏁 Payment {} confirmed at {}",
        receipt.signature,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    match receipt.story {
        Ok(()) => println!("🖼️ Panel requested. Run `view --wallet <address>` to download it."),
        Err(e) => {
            eprintln!("⚠️ Payment went through but the story was not created: {}", e);
            eprintln!("🔄 Run `next-panel` to ask for the panel again.");
        }
    }
    Ok(())
}

async fn next_panel(args: &Args, wallet: &str) -> Result<()> {
    let wallet = parse_address("wallet", wallet)?.to_string();
    let story = args.story_client()?;
    story.request_new_panel(&wallet).await?;
    println!("📨 Next panel requested for {}", wallet);
    Ok(())
}

async fn view(args: &Args, wallet: &str, out: &Path, attempts: u32) -> Result<()> {
    let wallet = parse_address("wallet", wallet)?.to_string();
    let story: Arc<dyn StoryService> = Arc::new(args.story_client()?);
    let policy = PollPolicy {
        max_attempts: attempts.max(1),
        ..PollPolicy::default()
    };
    let viewer = PanelViewer::new(story, policy);

    println!("🔍 Waiting for the panel of {}...", wallet);
    let view = viewer.view(&wallet).await?;
    let saved = PanelViewer::save(&view, out)?;

    println!("🖼️ Image saved to: {}", saved.image_path.display());
    match &view.panel {
        Some(panel) => {
            println!("\n🎬 Scene Description");
            println!("{}", panel.scene_description);
            println!("\n💬 Dialogue");
            println!("{}", panel.dialogue);
        }
        None => println!("📭 No panel text found for this wallet yet."),
    }
    println!("\n💾 Panel record saved to: {}", saved.record_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("🚨 PANIC: {}", panic_info);
        if let Some(location) = panic_info.location() {
            eprintln!("📍 Location: {}:{}", location.file(), location.line());
        }
    }));

    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let result = match &args.command {
        Command::Characters => {
            list_characters();
            Ok(())
        }
        Command::Buy {
            keypair,
            characters,
        } => buy(&args, keypair, characters).await,
        Command::NextPanel { wallet } => next_panel(&args, wallet).await,
        Command::View {
            wallet,
            out,
            attempts,
        } => view(&args, wallet, out, *attempts).await,
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

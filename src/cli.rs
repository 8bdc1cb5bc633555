use campaign_ledger::collaborators::{
    CampaignDataSource, CampaignFixture, CampaignReadCache, ClipDataProvider,
    FallbackCampaignSource, StaticCampaignData, TimeoutCampaignSource, TimeoutClipProvider,
    TracingAuditSink, UpstreamCaller,
};
use campaign_ledger::config::Config;
use campaign_ledger::error::{Error, Result};
use campaign_ledger::events::{EventBus, InMemoryEventBus};
use campaign_ledger::ingress::{EventIngress, LocalDelivery};
use campaign_ledger::leaderboard::LeaderboardEngine;
use campaign_ledger::ledger::{BalanceLedger, Transaction};
use campaign_ledger::logger;
use campaign_ledger::payout::PayoutCalculator;
use campaign_ledger::prize::PrizeDistributor;
use campaign_ledger::saga::CampaignClosureSaga;
use campaign_ledger::storage::{FileStorage, MemoryLeaderboardStore};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "campaign-ledger")]
#[command(about = "Campaign ledger CLI - creator balances, clip payouts and campaign closure")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: "human" or "json"
    #[arg(short, long)]
    pub format: Option<String>,

    /// Data directory path
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// Log level: "error", "warn", "info", "debug" or "trace"
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the data directory
    Init,

    /// Show a user's balance
    Balance {
        user: String,
    },

    /// List a user's transactions
    History {
        user: String,

        /// Only transactions of this campaign
        #[arg(short, long)]
        campaign: Option<String>,
    },

    /// Credit funds to a user's available balance
    Deposit {
        user: String,
        amount: u64,

        #[arg(short, long)]
        campaign: Option<String>,

        #[arg(long, default_value = "Deposit")]
        description: String,
    },

    /// Record that a creator funded a campaign
    Fund {
        creator: String,
        campaign: String,
        amount: u64,
    },

    /// Reserve the payment for one approved clip of a campaign fixture
    Approve {
        /// Campaign fixture (JSON)
        fixture: PathBuf,
        clip: String,
    },

    /// Show what every approved clip of a campaign would be paid
    PayoutPreview {
        fixture: PathBuf,
    },

    /// Release every clip payment of a campaign
    PayoutExecute {
        fixture: PathBuf,
    },

    /// Run campaign closure: leaderboard, prizes, releases, refund
    Close {
        fixture: PathBuf,
    },

    /// Handle one inbound event as the event consumer would
    Ingest {
        fixture: PathBuf,

        /// Routing key, e.g. "clip.approved"
        routing_key: String,

        /// JSON payload file (stdin if omitted)
        #[arg(short, long)]
        payload: Option<PathBuf>,
    },
}

/// The wired service graph over a file-backed ledger and one campaign fixture.
struct Services {
    campaign_id: String,
    fixture: CampaignFixture,
    bus: Arc<InMemoryEventBus>,
    ledger: Arc<BalanceLedger<FileStorage>>,
    payouts: Arc<PayoutCalculator<FileStorage>>,
    saga: Arc<CampaignClosureSaga<FileStorage>>,
    ingress: EventIngress<FileStorage>,
}

impl Services {
    /// Wire services for one fixture. A leaderboard-enabled campaign gets its standings
    /// computed from the fixture clips before any command runs.
    fn build(config: &Config, fixture_path: &Path) -> Result<Self> {
        let fixture = CampaignFixture::load(fixture_path)?;
        let campaign_id = fixture.campaign_id.clone();
        let data = Arc::new(StaticCampaignData::from_fixture(fixture.clone()));

        let bus = Arc::new(InMemoryEventBus::connected());
        let ledger = Arc::new(open_ledger(config, bus.clone())?);

        let caller = UpstreamCaller::new(
            config.get_upstream_timeout(),
            config.get_upstream_max_in_flight(),
        );
        let cache = Arc::new(CampaignReadCache::new());
        let campaigns: Arc<dyn CampaignDataSource> = Arc::new(FallbackCampaignSource::new(
            Arc::new(TimeoutCampaignSource::new(data.clone(), caller.clone())),
            cache.clone(),
        ));
        let clips: Arc<dyn ClipDataProvider> =
            Arc::new(TimeoutClipProvider::new(data.clone(), caller));

        let payouts = Arc::new(PayoutCalculator::new(
            ledger.clone(),
            campaigns.clone(),
            clips.clone(),
            config.get_platform_fee_percent(),
        ));
        let leaderboard = Arc::new(LeaderboardEngine::new(
            Arc::new(MemoryLeaderboardStore::new()),
            clips,
            bus.clone(),
        ));
        if fixture.campaign.enable_leaderboard {
            leaderboard.calculate_leaderboard(&campaign_id, fixture.campaign.leaderboard_metric)?;
        }
        let prizes = Arc::new(PrizeDistributor::new(
            ledger.clone(),
            leaderboard.clone(),
            data,
            bus.clone(),
        ));
        let saga = Arc::new(CampaignClosureSaga::new(
            ledger.clone(),
            leaderboard.clone(),
            prizes,
            campaigns.clone(),
            Arc::new(TracingAuditSink),
            bus.clone(),
        ));
        let ingress = EventIngress::new(
            ledger.clone(),
            payouts.clone(),
            leaderboard.clone(),
            saga.clone(),
            campaigns,
            cache,
        );

        Ok(Services {
            campaign_id,
            fixture,
            bus,
            ledger,
            payouts,
            saga,
            ingress,
        })
    }

    /// Persist a snapshot and log what was published during the command.
    fn finish(&self) -> Result<()> {
        self.ledger.checkpoint()?;
        for envelope in self.bus.published() {
            tracing::debug!(
                event_id = %envelope.event_id,
                routing_key = %envelope.routing_key,
                "event published"
            );
        }
        Ok(())
    }
}

fn open_ledger(config: &Config, bus: Arc<dyn EventBus>) -> Result<BalanceLedger<FileStorage>> {
    BalanceLedger::open(FileStorage::new(config), bus)
}

/// Read payload from file or stdin
fn read_payload(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path).map_err(|e| {
            Error::InvalidEvent(format!("Failed to read file {}: {}", path.display(), e))
        }),
        None => {
            use std::io::Read;
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .map_err(|e| Error::InvalidEvent(format!("Failed to read from stdin: {}", e)))?;
            Ok(buffer)
        }
    }
}

/// Format output based on format type
fn format_output<T: serde::Serialize + std::fmt::Debug>(data: &T, format: &str) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(data)
            .map_err(|e| Error::StorageError(format!("Failed to serialize JSON: {}", e))),
        _ => Ok(format!("{:#?}", data)),
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.set_data_dir(PathBuf::from(dir));
    }
    if let Some(format) = cli.format {
        config.set_output_format(format);
    }
    if let Some(level) = cli.log_level {
        config.set_log_level(level);
    }
    logger::init(config.get_log_level());
    let format = config.get_output_format().to_string();

    match cli.command {
        Commands::Init => {
            fs::create_dir_all(config.get_data_dir()).map_err(|e| {
                Error::StorageError(format!("Failed to create data directory: {}", e))
            })?;
            println!("Initialized data directory at: {}", config.get_data_dir().display());
            Ok(())
        }

        Commands::Balance { user } => {
            let ledger = open_ledger(&config, Arc::new(InMemoryEventBus::connected()))?;
            let balance = ledger.get_balance(&user)?;
            let output = BalanceOutput {
                user_id: balance.user_id.clone(),
                available: balance.available,
                pending: balance.pending,
                total: balance.total(),
            };
            println!("{}", format_output(&output, &format)?);
            Ok(())
        }

        Commands::History { user, campaign } => {
            let ledger = open_ledger(&config, Arc::new(InMemoryEventBus::connected()))?;
            let transactions = ledger.transactions_for(&user, campaign.as_deref())?;
            let output = HistoryOutput {
                user_id: user,
                transactions,
            };
            println!("{}", format_output(&output, &format)?);
            Ok(())
        }

        Commands::Deposit {
            user,
            amount,
            campaign,
            description,
        } => {
            let ledger = open_ledger(&config, Arc::new(InMemoryEventBus::connected()))?;
            let tx = ledger.add_funds(&user, amount, campaign.as_deref(), &description)?;
            ledger.checkpoint()?;
            println!("✓ Deposited {} to {} ({})", amount, user, tx.id);
            Ok(())
        }

        Commands::Fund {
            creator,
            campaign,
            amount,
        } => {
            let ledger = open_ledger(&config, Arc::new(InMemoryEventBus::connected()))?;
            match ledger.record_funding(&creator, amount, &campaign, "Campaign funded")? {
                Some(tx) => {
                    println!("✓ Funding of {} recorded for {} ({})", amount, campaign, tx.id)
                }
                None => println!("Campaign {} already funded", campaign),
            }
            ledger.checkpoint()?;
            Ok(())
        }

        Commands::Approve { fixture, clip } => {
            let services = Services::build(&config, &fixture)?;
            let approved = services
                .fixture
                .clips
                .iter()
                .find(|c| c.id == clip)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Clip {}", clip)))?;
            match services
                .payouts
                .reserve_clip_payment(&services.campaign_id, &approved)?
            {
                Some(tx) => println!("✓ Reserved {} for {} ({})", tx.amount, tx.user_id, tx.id),
                None => println!("Nothing reserved for clip {}", clip),
            }
            services.finish()
        }

        Commands::PayoutPreview { fixture } => {
            let services = Services::build(&config, &fixture)?;
            let payments = services
                .payouts
                .calculate_campaign_payments(&services.campaign_id)?;
            println!("{}", format_output(&payments, &format)?);
            Ok(())
        }

        Commands::PayoutExecute { fixture } => {
            let services = Services::build(&config, &fixture)?;
            let report = services.payouts.process_payouts(&services.campaign_id)?;
            println!("{}", format_output(&report, &format)?);
            services.finish()
        }

        Commands::Close { fixture } => {
            let services = Services::build(&config, &fixture)?;
            let outcome = services.saga.close_campaign(&services.campaign_id)?;
            println!("{}", format_output(&outcome, &format)?);
            services.finish()
        }

        Commands::Ingest {
            fixture,
            routing_key,
            payload,
        } => {
            let services = Services::build(&config, &fixture)?;
            let body = read_payload(payload.as_deref())?;
            let outcome = services
                .ingress
                .handle(&routing_key, &body, LocalDelivery::new(routing_key.clone()));
            println!("{:?}", outcome);
            services.finish()
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct BalanceOutput {
    user_id: String,
    available: u64,
    pending: u64,
    total: u64,
}

#[derive(Debug, serde::Serialize)]
struct HistoryOutput {
    user_id: String,
    transactions: Vec<Transaction>,
}

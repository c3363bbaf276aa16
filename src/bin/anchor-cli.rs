use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

use telemetry_anchor::codec::{self, LoraFrame, SensorReading};
use telemetry_anchor::crypto::daily_key::{derive_chained, derive_direct, parse_day};
use telemetry_anchor::crypto::{open_blocks, DailyKey, MasterKey};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const MASTER_KEY_ENV: &str = "ANCHOR_MASTER_KEY";

#[derive(Parser)]
#[command(name = "anchor-cli")]
#[command(about = "Key, payload and management tool for telemetry-anchor", long_about = None)]
struct Cli {
    /// Base URL of a running service (send, blocks).
    #[arg(short, long, default_value = "http://localhost:3001")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the day key for a vehicle (offline)
    DeriveKey {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Decode a hex payload, decrypting flagged blocks when a key is given (offline)
    Decode {
        payload: String,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Decode a 20-byte LoRa frame (offline)
    Frame {
        frame: String,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Submit a payload to POST /sendTx
    Send {
        #[arg(long)]
        payload: String,
        /// Epoch seconds/milliseconds or an RFC 3339 date.
        #[arg(long)]
        timestamp: String,
        #[arg(long)]
        vehicle: Option<String>,
        /// Back-end id or kind; repeat to select several. Default: all.
        #[arg(long = "backend")]
        backends: Vec<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// List feeless receipts, newest first
    Blocks {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Derivation {
    Direct,
    Chained,
}

#[derive(Args)]
struct KeyArgs {
    /// Day key as hex (16 or 32 bytes). Skips derivation.
    #[arg(long, conflicts_with = "master")]
    key: Option<String>,

    /// Master key as hex. Defaults to $ANCHOR_MASTER_KEY.
    #[arg(long)]
    master: Option<String>,

    #[arg(long, value_enum, default_value = "direct")]
    derivation: Derivation,

    /// Day to derive for (YYYY-MM-DD). Defaults to today, UTC.
    #[arg(long)]
    date: Option<String>,

    #[arg(long, default_value = "vehicle-123")]
    vehicle: String,

    /// Enrollment date for the chained derivation (YYYY-MM-DD).
    #[arg(long)]
    enrollment: Option<String>,
}

impl KeyArgs {
    /// `None` when neither a day key nor a master key is available.
    fn resolve(&self) -> CliResult<Option<DailyKey>> {
        if let Some(key) = &self.key {
            return Ok(Some(DailyKey::from_hex(key)?));
        }

        let master_hex = match &self.master {
            Some(hex) => hex.clone(),
            None => match std::env::var(MASTER_KEY_ENV) {
                Ok(hex) => hex,
                Err(_) => return Ok(None),
            },
        };
        let master = MasterKey::from_hex(&master_hex)?;

        let day = match &self.date {
            Some(date) => parse_day(date)?,
            None => chrono::Utc::now().date_naive(),
        };

        let key = match self.derivation {
            Derivation::Direct => derive_direct(&master, day),
            Derivation::Chained => {
                let enrollment = self
                    .enrollment
                    .as_deref()
                    .ok_or("--enrollment is required for the chained derivation")?;
                derive_chained(&master, &self.vehicle, parse_day(enrollment)?, day)
            }
        };
        Ok(Some(key))
    }

    fn require(&self) -> CliResult<DailyKey> {
        self.resolve()?
            .ok_or_else(|| format!("no key: pass --key, --master or set {MASTER_KEY_ENV}").into())
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::DeriveKey { key } => {
            let day_key = key.require()?;
            print_json(&json!({
                "vehicleId": key.vehicle,
                "date": key.date,
                "key": day_key.to_hex(),
                "bytes": day_key.len(),
            }))?;
        }
        Commands::Decode { payload, key } => {
            let blocks = codec::decode(&payload)?;
            match key.resolve()? {
                Some(day_key) => {
                    let opened = open_blocks(&blocks, &day_key)?;
                    let suspect = opened.iter().filter(|b| b.is_suspect()).count();
                    print_json(&opened)?;
                    if suspect > 0 {
                        eprintln!("warning: {suspect} block(s) look like a wrong key or day");
                    }
                }
                None => {
                    let readings: Vec<Value> = blocks
                        .iter()
                        .map(|b| match SensorReading::from_block(*b) {
                            Some(reading) => json!({ "encrypted": false, "reading": reading }),
                            None => json!({ "encrypted": true, "block": b.to_hex() }),
                        })
                        .collect();
                    print_json(&readings)?;
                }
            }
        }
        Commands::Frame { frame, key } => {
            let parsed = LoraFrame::parse_hex(&frame)?;
            match key.resolve()? {
                Some(day_key) => print_json(&parsed.open(&day_key)?)?,
                None => print_json(&json!({
                    "counter": parsed.counter,
                    "iv": hex::encode(parsed.iv()),
                    "clear": parsed.clear,
                }))?,
            }
        }
        Commands::Send {
            payload,
            timestamp,
            vehicle,
            backends,
            timeout_ms,
        } => {
            let timestamp: Value = match timestamp.parse::<u64>() {
                Ok(n) => json!(n),
                Err(_) => json!(timestamp),
            };
            let body = json!({
                "payload": payload,
                "timestamp": timestamp,
                "vehicleId": vehicle,
                "backends": backends,
                "timeoutMs": timeout_ms,
            });
            let res = reqwest::Client::new()
                .post(format!("{}/sendTx", cli.url))
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Blocks { limit } => {
            let res = reqwest::Client::new()
                .get(format!("{}/api/blocks", cli.url))
                .query(&[("limit", limit)])
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn print_response(res: reqwest::Response) -> CliResult<()> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    print_json(&json)
}

//! Dove inspector
//!
//! Loads the config, resolves every cache type and prints the results as
//! JSON to stdout.
//!
//! Usage:
//!   dove-inspect --config dove.toml [--principal <hex key>]

use dove_cache::caches::{
    AssetCache, AuthorityCache, CollateralCache, DoveCache, DvdCache, SavingsCache,
    StabilityCache, StablecoinCache, VaultCache, WorldCache,
};
use dove_cache::CacheType;
use dove_client::{init_tracing, Session, TelemetryConfig};
use dove_core::{AccountKey, DoveConfig, DoveError, DoveResult, Principal};
use serde::Serialize;
use serde_json::{json, Map, Value};

#[tokio::main]
async fn main() -> DoveResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = DoveConfig::load()?;
    let session = Session::connect(config, None)?;
    if let Some(principal) = principal_from_args()? {
        session.set_principal(Some(principal))?;
    }

    for (id, result) in session.resolve_all().await? {
        if let Err(e) = result {
            tracing::warn!(cache = %id, error = %e, "Resolve failed");
        }
    }

    let mut report = Map::new();
    report.insert(
        "principal".to_string(),
        json!(session.principal()?.map(|p| p.key().to_hex())),
    );
    insert::<WorldCache>(&session, &mut report)?;
    insert::<CollateralCache>(&session, &mut report)?;
    insert::<StabilityCache>(&session, &mut report)?;
    insert::<AuthorityCache>(&session, &mut report)?;
    insert::<VaultCache>(&session, &mut report)?;
    insert::<SavingsCache>(&session, &mut report)?;
    insert::<DvdCache>(&session, &mut report)?;
    insert::<DoveCache>(&session, &mut report)?;
    insert::<AssetCache>(&session, &mut report)?;
    insert::<StablecoinCache>(&session, &mut report)?;

    match serde_json::to_string_pretty(&Value::Object(report)) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize report: {}", e);
            std::process::exit(1);
        }
    }

    session.shutdown();
    Ok(())
}

/// Add the current entry of `C` to the report: its value, or its error.
fn insert<C>(session: &Session, report: &mut Map<String, Value>) -> DoveResult<()>
where
    C: CacheType,
    C::Value: Serialize,
{
    let entry = match session.registry().peek_entry(C::ID)? {
        None => json!({ "status": "absent" }),
        Some(snapshot) => match &snapshot.error {
            Some(error) => json!({ "status": "failed", "error": error.to_string() }),
            None => {
                let value = session.registry().peek::<C>()?;
                json!({
                    "status": format!("{:?}", snapshot.status).to_lowercase(),
                    "generation": snapshot.stamp.generation.value(),
                    "value": value.as_deref(),
                })
            }
        },
    };
    report.insert(C::ID.to_string(), entry);
    Ok(())
}

fn principal_from_args() -> Result<Option<Principal>, DoveError> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--principal" {
            return match args.next() {
                Some(hex) => Ok(Some(Principal::new(AccountKey::from_hex(&hex)?))),
                None => Ok(None),
            };
        }
    }
    Ok(None)
}

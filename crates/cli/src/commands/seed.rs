use chrono::Utc;

use crate::commands::CommandResult;
use tradepost_core::config::{AppConfig, LoadOptions};
use tradepost_core::domain::jargon::{JargonEntry, JargonEntryId, JargonSource};
use tradepost_core::domain::reference::{
    Category, CategoryId, Condition, ConditionId, Manufacturer, ManufacturerId, Unit, UnitId,
};
use tradepost_db::repositories::{
    JargonRepository, ReferenceRepository, SqlJargonRepository, SqlReferenceRepository,
};
use tradepost_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let reference = SqlReferenceRepository::new(pool.clone());
        let jargon = SqlJargonRepository::new(pool.clone());

        let run_result = load_seed_dataset(&reference, &jargon)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8));

        pool.close().await;
        run_result
    });

    match result {
        Ok(counts) => CommandResult::success(
            "seed",
            format!(
                "seeded {} categories, {} manufacturers, {} units, {} conditions, {} jargon entries",
                counts.categories,
                counts.manufacturers,
                counts.units,
                counts.conditions,
                counts.jargon
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedCounts {
    categories: usize,
    manufacturers: usize,
    units: usize,
    conditions: usize,
    jargon: usize,
}

// Upserts are keyed on name, so re-running the command is safe and picks
// up alias additions without duplicating rows.
async fn load_seed_dataset(
    reference: &dyn ReferenceRepository,
    jargon: &dyn JargonRepository,
) -> Result<SeedCounts, tradepost_db::repositories::RepositoryError> {
    let categories = seed_categories();
    let manufacturers = seed_manufacturers();
    let units = seed_units();
    let conditions = seed_conditions();
    let jargon_entries = seed_jargon();

    let counts = SeedCounts {
        categories: categories.len(),
        manufacturers: manufacturers.len(),
        units: units.len(),
        conditions: conditions.len(),
        jargon: jargon_entries.len(),
    };

    for category in categories {
        reference.save_category(category).await?;
    }
    for manufacturer in manufacturers {
        reference.save_manufacturer(manufacturer).await?;
    }
    for unit in units {
        reference.save_unit(unit).await?;
    }
    for condition in conditions {
        reference.save_condition(condition).await?;
    }
    for entry in jargon_entries {
        jargon.record_observation(entry).await?;
    }

    Ok(counts)
}

fn category(id: &str, name: &str, aliases: &[&str]) -> Category {
    Category {
        id: CategoryId(id.to_string()),
        name: name.to_string(),
        aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
    }
}

fn seed_categories() -> Vec<Category> {
    vec![
        category("cat-pipe", "Pipe", &["piping", "tubing", "tube"]),
        category("cat-valve", "Valves", &["valve", "ball valve", "gate valve"]),
        category("cat-fitting", "Fittings", &["fitting", "elbow", "flange", "coupling"]),
        category("cat-pump", "Pumps", &["pump"]),
        category("cat-motor", "Motors", &["motor", "electric motor"]),
        category("cat-structural", "Structural Steel", &["beam", "channel", "angle", "plate"]),
        category("cat-electrical", "Electrical", &["breaker", "transformer", "switchgear"]),
        category("cat-instrument", "Instrumentation", &["gauge", "transmitter", "meter"]),
    ]
}

fn manufacturer(id: &str, name: &str, aliases: &[&str]) -> Manufacturer {
    Manufacturer {
        id: ManufacturerId(id.to_string()),
        name: name.to_string(),
        aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
    }
}

fn seed_manufacturers() -> Vec<Manufacturer> {
    vec![
        manufacturer("mfr-grundfos", "Grundfos", &[]),
        manufacturer("mfr-siemens", "Siemens", &[]),
        manufacturer("mfr-swagelok", "Swagelok", &[]),
        manufacturer("mfr-victaulic", "Victaulic", &["vic"]),
        manufacturer("mfr-weg", "WEG", &[]),
        manufacturer("mfr-square-d", "Square D", &["squared", "sq d"]),
    ]
}

fn unit(id: &str, name: &str, abbreviation: Option<&str>) -> Unit {
    Unit {
        id: UnitId(id.to_string()),
        name: name.to_string(),
        abbreviation: abbreviation.map(|value| value.to_string()),
    }
}

fn seed_units() -> Vec<Unit> {
    vec![
        unit("unit-each", "each", Some("ea")),
        unit("unit-foot", "foot", Some("ft")),
        unit("unit-meter", "meter", Some("m")),
        unit("unit-piece", "piece", Some("pc")),
        unit("unit-joint", "joint", Some("jt")),
        unit("unit-ton", "ton", Some("tn")),
        unit("unit-pound", "pound", Some("lb")),
        unit("unit-lot", "lot", None),
    ]
}

fn seed_conditions() -> Vec<Condition> {
    ["new", "used", "refurbished", "surplus"]
        .iter()
        .map(|name| Condition {
            id: ConditionId(format!("cond-{name}")),
            name: (*name).to_string(),
        })
        .collect()
}

fn seed_jargon_entry(id: &str, acronym: &str, expansion: &str) -> JargonEntry {
    let now = Utc::now();
    JargonEntry {
        id: JargonEntryId(id.to_string()),
        acronym: acronym.to_string(),
        expansion: expansion.to_string(),
        source: JargonSource::Seed,
        confidence: 1.0,
        usage_count: 1,
        verified: true,
        created_at: now,
        updated_at: now,
    }
}

fn seed_jargon() -> Vec<JargonEntry> {
    vec![
        seed_jargon_entry("jrg-wts", "WTS", "want to sell"),
        seed_jargon_entry("jrg-wtb", "WTB", "want to buy"),
        seed_jargon_entry("jrg-obo", "OBO", "or best offer"),
        seed_jargon_entry("jrg-bnib", "BNIB", "brand new in box"),
        seed_jargon_entry("jrg-nos", "NOS", "new old stock"),
        seed_jargon_entry("jrg-fob", "FOB", "free on board"),
        seed_jargon_entry("jrg-sch", "SCH", "schedule"),
        seed_jargon_entry("jrg-smls", "SMLS", "seamless"),
        seed_jargon_entry("jrg-erw", "ERW", "electric resistance welded"),
        seed_jargon_entry("jrg-btc", "BTC", "beveled two ends, threaded and coupled"),
    ]
}

#[cfg(test)]
mod tests {
    use tradepost_db::repositories::{
        JargonRepository, ReferenceRepository, SqlJargonRepository, SqlReferenceRepository,
    };
    use tradepost_db::{connect_with_settings, migrations};

    use super::load_seed_dataset;

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate_rows() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let reference = SqlReferenceRepository::new(pool.clone());
        let jargon = SqlJargonRepository::new(pool.clone());

        let first = load_seed_dataset(&reference, &jargon).await.expect("first seed");
        let second = load_seed_dataset(&reference, &jargon).await.expect("second seed");
        assert_eq!(first.categories, second.categories);

        let vocabulary = reference.load_vocabulary().await.expect("load vocabulary");
        assert_eq!(vocabulary.categories.len(), first.categories);
        assert_eq!(vocabulary.units.len(), first.units);
        assert_eq!(vocabulary.conditions.len(), first.conditions);

        let entries = jargon.list_all().await.expect("list jargon");
        assert_eq!(entries.len(), first.jargon);

        pool.close().await;
    }

    #[tokio::test]
    async fn seeded_jargon_is_verified_and_reaches_the_prompt_list() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let reference = SqlReferenceRepository::new(pool.clone());
        let jargon = SqlJargonRepository::new(pool.clone());
        load_seed_dataset(&reference, &jargon).await.expect("seed");

        let verified = jargon.list_verified().await.expect("list verified");
        assert!(verified.iter().any(|entry| entry.acronym == "WTS"));
        assert!(verified.iter().all(|entry| entry.verified));

        pool.close().await;
    }
}

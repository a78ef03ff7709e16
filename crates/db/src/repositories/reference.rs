use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::domain::reference::{
    Category, CategoryId, Condition, ConditionId, Manufacturer, ManufacturerId, Unit, UnitId,
    Vocabulary,
};

use super::{parse_json, to_json, ReferenceRepository, RepositoryError};
use crate::DbPool;

pub struct SqlReferenceRepository {
    pool: DbPool,
}

impl SqlReferenceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReferenceRepository for SqlReferenceRepository {
    async fn load_vocabulary(&self) -> Result<Vocabulary, RepositoryError> {
        let categories = sqlx::query("SELECT id, name, aliases_json FROM ref_category ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(category_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let manufacturers =
            sqlx::query("SELECT id, name, aliases_json FROM ref_manufacturer ORDER BY name")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(manufacturer_from_row)
                .collect::<Result<Vec<_>, _>>()?;

        let units = sqlx::query("SELECT id, name, abbreviation FROM ref_unit ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(unit_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let conditions = sqlx::query("SELECT id, name FROM ref_condition ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(condition_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Vocabulary { categories, manufacturers, units, conditions })
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        let aliases_json = to_json("aliases_json", &category.aliases)?;

        sqlx::query(
            "INSERT INTO ref_category (id, name, aliases_json) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET aliases_json = excluded.aliases_json",
        )
        .bind(&category.id.0)
        .bind(&category.name)
        .bind(aliases_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_manufacturer(&self, manufacturer: Manufacturer) -> Result<(), RepositoryError> {
        let aliases_json = to_json("aliases_json", &manufacturer.aliases)?;

        sqlx::query(
            "INSERT INTO ref_manufacturer (id, name, aliases_json) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET aliases_json = excluded.aliases_json",
        )
        .bind(&manufacturer.id.0)
        .bind(&manufacturer.name)
        .bind(aliases_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_unit(&self, unit: Unit) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ref_unit (id, name, abbreviation) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET abbreviation = excluded.abbreviation",
        )
        .bind(&unit.id.0)
        .bind(&unit.name)
        .bind(unit.abbreviation.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_condition(&self, condition: Condition) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ref_condition (id, name) VALUES (?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&condition.id.0)
        .bind(&condition.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn category_from_row(row: SqliteRow) -> Result<Category, RepositoryError> {
    let aliases_raw = row.try_get::<String, _>("aliases_json")?;
    Ok(Category {
        id: CategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        aliases: parse_json("aliases_json", &aliases_raw)?,
    })
}

fn manufacturer_from_row(row: SqliteRow) -> Result<Manufacturer, RepositoryError> {
    let aliases_raw = row.try_get::<String, _>("aliases_json")?;
    Ok(Manufacturer {
        id: ManufacturerId(row.try_get("id")?),
        name: row.try_get("name")?,
        aliases: parse_json("aliases_json", &aliases_raw)?,
    })
}

fn unit_from_row(row: SqliteRow) -> Result<Unit, RepositoryError> {
    Ok(Unit {
        id: UnitId(row.try_get("id")?),
        name: row.try_get("name")?,
        abbreviation: row.try_get("abbreviation")?,
    })
}

fn condition_from_row(row: SqliteRow) -> Result<Condition, RepositoryError> {
    Ok(Condition { id: ConditionId(row.try_get("id")?), name: row.try_get("name")? })
}

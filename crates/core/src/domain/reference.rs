use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManufacturerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionId(pub String);

/// Reference vocabulary tables. The read-through cache is keyed on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefTable {
    Categories,
    Manufacturers,
    Units,
    Conditions,
}

impl RefTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Manufacturers => "manufacturers",
            Self::Units => "units",
            Self::Conditions => "conditions",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: ManufacturerId,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub abbreviation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub name: String,
}

/// Everything prompt assembly needs in one load: the four vocabularies
/// plus the verified jargon expansions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vocabulary {
    pub categories: Vec<Category>,
    pub manufacturers: Vec<Manufacturer>,
    pub units: Vec<Unit>,
    pub conditions: Vec<Condition>,
}

impl Vocabulary {
    pub fn find_category(&self, name: &str) -> Option<&Category> {
        let needle = normalize(name);
        self.categories.iter().find(|category| {
            normalize(&category.name) == needle
                || category.aliases.iter().any(|alias| normalize(alias) == needle)
        })
    }

    pub fn find_manufacturer(&self, name: &str) -> Option<&Manufacturer> {
        let needle = normalize(name);
        self.manufacturers.iter().find(|manufacturer| {
            normalize(&manufacturer.name) == needle
                || manufacturer.aliases.iter().any(|alias| normalize(alias) == needle)
        })
    }

    pub fn find_unit(&self, name: &str) -> Option<&Unit> {
        let needle = normalize(name);
        self.units.iter().find(|unit| {
            normalize(&unit.name) == needle
                || unit.abbreviation.as_deref().map(normalize) == Some(needle.clone())
        })
    }

    pub fn find_condition(&self, name: &str) -> Option<&Condition> {
        let needle = normalize(name);
        self.conditions.iter().find(|condition| normalize(&condition.name) == needle)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

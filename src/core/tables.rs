//! External data tables: races, settlement types, and name pools.

use std::path::Path;
use thiserror::Error;

use crate::schema::feature::{AgeGroup, Gender};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{table} line {line}: {message}")]
    Parse {
        table: &'static str,
        line: usize,
        message: String,
    },
    #[error("{0} table is empty")]
    Empty(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Age-group upper bounds (inclusive) for one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Race {
    pub key: String,
    pub child_upper: u32,
    pub adolescent_upper: u32,
    pub adult_upper: u32,
    pub elderly_upper: u32,
}

impl Race {
    /// Inclusive age bounds of `group`.
    pub fn bounds(&self, group: AgeGroup) -> (u32, u32) {
        match group {
            AgeGroup::Child => (0, self.child_upper),
            AgeGroup::Adolescent => (self.child_upper + 1, self.adolescent_upper),
            AgeGroup::Adult => (self.adolescent_upper + 1, self.adult_upper),
            AgeGroup::Elderly => (self.adult_upper + 1, self.elderly_upper),
        }
    }

    /// First age at which a member of this race counts as an adult.
    pub fn adulthood(&self) -> u32 {
        self.adolescent_upper + 1
    }

    pub fn age_group_for(&self, age: u32) -> Option<AgeGroup> {
        AgeGroup::ALL.into_iter().find(|group| {
            let (lower, upper) = self.bounds(*group);
            age >= lower && age <= upper
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RaceTable {
    races: Vec<Race>,
}

impl RaceTable {
    /// Parse rows of `race  childUpper  adolescentUpper  adultUpper  elderlyUpper`.
    pub fn parse_tsv(input: &str) -> Result<Self, DataError> {
        let mut races = Vec::new();
        for (line, fields) in tsv_rows(input) {
            if fields.len() != 5 {
                return Err(parse_error("race", line, "expected 5 tab-separated fields"));
            }
            let bounds = parse_numbers("race", line, &fields[1..])?;
            if !bounds.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(parse_error("race", line, "age bounds must be strictly increasing"));
            }
            races.push(Race {
                key: fields[0].to_string(),
                child_upper: bounds[0],
                adolescent_upper: bounds[1],
                adult_upper: bounds[2],
                elderly_upper: bounds[3],
            });
        }
        if races.is_empty() {
            return Err(DataError::Empty("race"));
        }
        Ok(Self { races })
    }

    pub fn get(&self, key: &str) -> Option<&Race> {
        self.races.iter().find(|race| race.key == key)
    }

    /// Races in table order.
    pub fn races(&self) -> &[Race] {
        &self.races
    }

    /// Adulthood threshold for `key`; unknown races never qualify.
    pub fn adulthood(&self, key: &str) -> u32 {
        self.get(key).map_or(u32::MAX, Race::adulthood)
    }
}

/// Population bands of one settlement type. A type with all-zero bands
/// has no size class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementType {
    pub key: String,
    pub small_lower: u32,
    pub small_upper: u32,
    pub large_upper: u32,
}

impl SettlementType {
    pub fn has_size_bands(&self) -> bool {
        self.large_upper > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettlementTypeTable {
    types: Vec<SettlementType>,
}

impl SettlementTypeTable {
    /// Parse rows of `type  smallLower  smallUpper/largeLower  largeUpper`.
    pub fn parse_tsv(input: &str) -> Result<Self, DataError> {
        let mut types = Vec::new();
        for (line, fields) in tsv_rows(input) {
            if fields.len() != 4 {
                return Err(parse_error(
                    "settlement type",
                    line,
                    "expected 4 tab-separated fields",
                ));
            }
            let bands = parse_numbers("settlement type", line, &fields[1..])?;
            if bands[0] > bands[1] || bands[1] > bands[2] {
                return Err(parse_error(
                    "settlement type",
                    line,
                    "population bands must not decrease",
                ));
            }
            types.push(SettlementType {
                key: fields[0].to_string(),
                small_lower: bands[0],
                small_upper: bands[1],
                large_upper: bands[2],
            });
        }
        if types.is_empty() {
            return Err(DataError::Empty("settlement type"));
        }
        Ok(Self { types })
    }

    pub fn get(&self, key: &str) -> Option<&SettlementType> {
        self.types.iter().find(|t| t.key == key)
    }

    pub fn types(&self) -> &[SettlementType] {
        &self.types
    }
}

/// Newline-delimited name lists.
#[derive(Debug, Clone, Default)]
pub struct NamePools {
    pub female: Vec<String>,
    pub male: Vec<String>,
    pub neutral: Vec<String>,
    pub family: Vec<String>,
    /// Whole settlement names.
    pub settlement_single: Vec<String>,
    pub settlement_prefix: Vec<String>,
    pub settlement_suffix: Vec<String>,
}

impl NamePools {
    pub fn parse_list(input: &str) -> Vec<String> {
        input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    /// Given names suitable for `gender`. Non-binary NPCs draw from the
    /// neutral pool, falling back to every pool when it is empty.
    pub fn given_names(&self, gender: Gender) -> Vec<&str> {
        let pool = match gender {
            Gender::Female => &self.female,
            Gender::Male => &self.male,
            Gender::NonBinary => &self.neutral,
        };
        if !pool.is_empty() {
            return pool.iter().map(String::as_str).collect();
        }
        self.female
            .iter()
            .chain(&self.male)
            .chain(&self.neutral)
            .map(String::as_str)
            .collect()
    }

    fn load_from_dir(dir: &Path) -> Result<Self, DataError> {
        let read = |file: &str| -> Result<Vec<String>, DataError> {
            let path = dir.join(file);
            if path.exists() {
                Ok(Self::parse_list(&std::fs::read_to_string(path)?))
            } else {
                Ok(Vec::new())
            }
        };
        Ok(Self {
            female: read("female.txt")?,
            male: read("male.txt")?,
            neutral: read("neutral.txt")?,
            family: read("family.txt")?,
            settlement_single: read("settlement_single.txt")?,
            settlement_prefix: read("settlement_prefix.txt")?,
            settlement_suffix: read("settlement_suffix.txt")?,
        })
    }
}

/// Everything the feature factory samples from.
#[derive(Debug, Clone, Default)]
pub struct GenerationData {
    pub races: RaceTable,
    pub settlement_types: SettlementTypeTable,
    pub names: NamePools,
}

impl GenerationData {
    /// The tables shipped under `data/`.
    pub fn builtin() -> Result<Self, DataError> {
        Ok(Self {
            races: RaceTable::parse_tsv(include_str!("../../data/races.tsv"))?,
            settlement_types: SettlementTypeTable::parse_tsv(include_str!(
                "../../data/settlement_types.tsv"
            ))?,
            names: NamePools {
                female: NamePools::parse_list(include_str!("../../data/names/female.txt")),
                male: NamePools::parse_list(include_str!("../../data/names/male.txt")),
                neutral: NamePools::parse_list(include_str!("../../data/names/neutral.txt")),
                family: NamePools::parse_list(include_str!("../../data/names/family.txt")),
                settlement_single: NamePools::parse_list(include_str!(
                    "../../data/names/settlement_single.txt"
                )),
                settlement_prefix: NamePools::parse_list(include_str!(
                    "../../data/names/settlement_prefix.txt"
                )),
                settlement_suffix: NamePools::parse_list(include_str!(
                    "../../data/names/settlement_suffix.txt"
                )),
            },
        })
    }

    /// Load `races.tsv`, `settlement_types.tsv` and `names/*.txt` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self, DataError> {
        let races = RaceTable::parse_tsv(&std::fs::read_to_string(dir.join("races.tsv"))?)?;
        let settlement_types = SettlementTypeTable::parse_tsv(&std::fs::read_to_string(
            dir.join("settlement_types.tsv"),
        )?)?;
        let names = NamePools::load_from_dir(&dir.join("names"))?;
        Ok(Self {
            races,
            settlement_types,
            names,
        })
    }
}

fn tsv_rows(input: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    input.lines().enumerate().filter_map(|(index, line)| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            None
        } else {
            Some((index + 1, trimmed.split('\t').map(str::trim).collect()))
        }
    })
}

fn parse_numbers(table: &'static str, line: usize, fields: &[&str]) -> Result<Vec<u32>, DataError> {
    fields
        .iter()
        .map(|field| {
            field
                .parse::<u32>()
                .map_err(|_| parse_error(table, line, &format!("invalid number '{}'", field)))
        })
        .collect()
}

fn parse_error(table: &'static str, line: usize, message: &str) -> DataError {
    DataError::Parse {
        table,
        line,
        message: message.to_string(),
    }
}

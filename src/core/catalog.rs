//! Predicate catalog: the read-only bank of relation kinds.

use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

use crate::schema::feature::FeatureType;
use crate::schema::predicate::{Predicate, PredicateId, PredicateLookup};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),
    #[error("predicate table line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const BUILTIN_PREDICATES: &str = include_str!("../../data/predicates.tsv");

/// A row of the predicate table before opposites are wired up.
struct RawPredicate {
    subject_type: FeatureType,
    label: String,
    object_type: FeatureType,
    bidirectional: bool,
    weight: u32,
    opposite_label: String,
}

/// All predicates, indexed by id and by label. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct PredicateCatalog {
    predicates: Vec<Predicate>,
    by_label: FxHashMap<String, PredicateId>,
}

impl PredicateCatalog {
    /// The catalog shipped in `data/predicates.tsv`.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::parse_tsv(BUILTIN_PREDICATES)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_tsv(&contents)
    }

    /// Parse tab-separated rows of
    /// `subject  label  object  bidirectional  weight  opposite`.
    ///
    /// Loading is two-pass: every row is instantiated first, then each
    /// opposite label is resolved against the full table.
    pub fn parse_tsv(input: &str) -> Result<Self, CatalogError> {
        let mut raw = Vec::new();
        for (index, line) in input.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            raw.push(parse_row(trimmed, line_no)?);
        }
        Self::from_rows(raw)
    }

    fn from_rows(raw: Vec<RawPredicate>) -> Result<Self, CatalogError> {
        let mut by_label = FxHashMap::default();
        for (index, row) in raw.iter().enumerate() {
            if by_label.insert(row.label.clone(), PredicateId(index)).is_some() {
                return Err(CatalogError::MalformedCatalog(format!(
                    "duplicate predicate label '{}'",
                    row.label
                )));
            }
        }

        let mut predicates = Vec::with_capacity(raw.len());
        for (index, row) in raw.iter().enumerate() {
            let opposite = if row.bidirectional {
                PredicateId(index)
            } else {
                *by_label.get(&row.opposite_label).ok_or_else(|| {
                    CatalogError::MalformedCatalog(format!(
                        "opposite '{}' of predicate '{}' does not exist",
                        row.opposite_label, row.label
                    ))
                })?
            };
            let opposite_row = &raw[opposite.0];
            if opposite_row.subject_type != row.object_type
                || opposite_row.object_type != row.subject_type
            {
                return Err(CatalogError::MalformedCatalog(format!(
                    "predicate '{}' and its opposite '{}' disagree on feature types",
                    row.label, opposite_row.label
                )));
            }
            predicates.push(Predicate {
                id: PredicateId(index),
                subject_type: row.subject_type,
                label: row.label.clone(),
                object_type: row.object_type,
                bidirectional: row.bidirectional,
                weight: row.weight,
                opposite_label: opposite_row.label.clone(),
                opposite,
            });
        }

        Ok(Self {
            predicates,
            by_label,
        })
    }

    pub fn get(&self, id: PredicateId) -> Option<&Predicate> {
        self.predicates.get(id.0)
    }

    pub fn by_label(&self, label: &str) -> Option<&Predicate> {
        self.by_label.get(label).and_then(|id| self.get(*id))
    }

    pub fn opposite(&self, predicate: &Predicate) -> Option<&Predicate> {
        self.get(predicate.opposite)
    }

    /// Predicates a feature of `subject_type` can hold, in table order.
    pub fn for_subject(&self, subject_type: FeatureType) -> impl Iterator<Item = &Predicate> {
        self.predicates
            .iter()
            .filter(move |predicate| predicate.subject_type == subject_type)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl PredicateLookup for PredicateCatalog {
    fn label(&self, id: PredicateId) -> Option<&str> {
        self.get(id).map(|predicate| predicate.label.as_str())
    }
}

fn parse_row(line: &str, line_no: usize) -> Result<RawPredicate, CatalogError> {
    let parse_error = |message: String| CatalogError::Parse {
        line: line_no,
        message,
    };
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < 5 {
        return Err(parse_error(format!(
            "expected 6 tab-separated fields, found {}",
            fields.len()
        )));
    }

    let feature_type = |key: &str| {
        FeatureType::from_key(key).ok_or_else(|| parse_error(format!("unknown feature type '{}'", key)))
    };
    let subject_type = feature_type(fields[0])?;
    let object_type = feature_type(fields[2])?;
    let bidirectional = fields[3]
        .to_ascii_lowercase()
        .parse::<bool>()
        .map_err(|_| parse_error(format!("invalid bidirectional flag '{}'", fields[3])))?;
    let weight = fields[4]
        .parse::<u32>()
        .map_err(|_| parse_error(format!("invalid weight '{}'", fields[4])))?;
    let label = fields[1].to_string();
    let opposite_label = match fields.get(5) {
        Some(opposite) if !opposite.is_empty() => opposite.to_string(),
        _ if bidirectional => label.clone(),
        _ => return Err(parse_error(format!("predicate '{}' has no opposite", label))),
    };

    Ok(RawPredicate {
        subject_type,
        label,
        object_type,
        bidirectional,
        weight,
        opposite_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::predicate::labels;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = PredicateCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 12);

        let parent = catalog.by_label(labels::PARENT).unwrap();
        let child = catalog.opposite(parent).unwrap();
        assert_eq!(child.label, labels::CHILD);
        assert_eq!(catalog.opposite(child).unwrap().id, parent.id);

        let partner = catalog.by_label(labels::PARTNER).unwrap();
        assert!(partner.bidirectional);
        assert_eq!(partner.opposite, partner.id);
    }

    #[test]
    fn subject_type_filter() {
        let catalog = PredicateCatalog::builtin().unwrap();
        let settlement_labels: Vec<&str> = catalog
            .for_subject(FeatureType::Settlement)
            .map(|p| p.label.as_str())
            .collect();
        assert_eq!(
            settlement_labels,
            vec![labels::RESIDENCE, labels::RULES, labels::TRADES, labels::RIVAL]
        );
        assert!(catalog
            .for_subject(FeatureType::Npc)
            .all(|p| p.subject_type == FeatureType::Npc));
    }

    #[test]
    fn unresolved_opposite_is_malformed() {
        let table = "NPC\tmentor\tNPC\tfalse\t5\tstudent\n";
        let result = PredicateCatalog::parse_tsv(table);
        assert!(matches!(result, Err(CatalogError::MalformedCatalog(_))));
    }

    #[test]
    fn opposite_resolves_regardless_of_order() {
        let table = "NPC\tstudent\tNPC\tfalse\t5\tmentor\nNPC\tmentor\tNPC\tfalse\t5\tstudent\n";
        let catalog = PredicateCatalog::parse_tsv(table).unwrap();
        let student = catalog.by_label("student").unwrap();
        assert_eq!(catalog.opposite(student).unwrap().label, "mentor");
    }

    #[test]
    fn mismatched_types_are_malformed() {
        let table = "NPC\tresident\tSettlement\tfalse\t5\tneighbor\nNPC\tneighbor\tNPC\tfalse\t5\tresident\n";
        assert!(matches!(
            PredicateCatalog::parse_tsv(table),
            Err(CatalogError::MalformedCatalog(_))
        ));
    }

    #[test]
    fn bad_rows_report_line() {
        let table = "# header\nNPC\tpartner\tNPC\tmaybe\t5\tpartner\n";
        match PredicateCatalog::parse_tsv(table) {
            Err(CatalogError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_labels_are_malformed() {
        let table = "NPC\tpartner\tNPC\ttrue\t5\tpartner\nNPC\tpartner\tNPC\ttrue\t1\tpartner\n";
        assert!(matches!(
            PredicateCatalog::parse_tsv(table),
            Err(CatalogError::MalformedCatalog(_))
        ));
    }
}

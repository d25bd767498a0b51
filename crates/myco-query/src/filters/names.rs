//! Name lookups and the taxonomic closure behind `names`.
//!
//! A lookup starts from the names the caller listed and may grow through
//! synonyms and subtaxa, or shrink by excluding the originals. The set is
//! resolved through the [`Directory`](crate::Directory) while compiling, so
//! the compiled predicate is a plain id set.

use std::collections::{BTreeMap, BTreeSet};

use super::common::{list_value, text_value};
use super::{FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::{self, RecordType};
use crate::store::Taxon;
use crate::value::Id;

/// Taxonomic ranks, lowest first.
pub const RANKS: &[&str] = &[
    "Form",
    "Variety",
    "Subspecies",
    "Species",
    "Stirps",
    "Subsection",
    "Section",
    "Subgenus",
    "Genus",
    "Family",
    "Order",
    "Class",
    "Phylum",
    "Kingdom",
    "Domain",
    "Group",
];

fn rank_index(rank: &str) -> Option<usize> {
    RANKS.iter().position(|r| r.eq_ignore_ascii_case(rank))
}

/// Family through Domain. Groups are informal and sort with genera.
pub(super) fn is_above_genus(rank: &str) -> bool {
    matches!(rank_index(rank), Some(i) if (9..=14).contains(&i))
}

/// Best guess at a rank from the spelling of a name.
pub(super) fn guess_rank(text_name: &str) -> &'static str {
    let name = text_name.trim();
    if name.contains(' ') {
        return "Species";
    }
    let lower = name.to_ascii_lowercase();
    if lower == "fungi" {
        "Kingdom"
    } else if lower.ends_with("mycota") {
        "Phylum"
    } else if lower.ends_with("mycetes") {
        "Class"
    } else if lower.ends_with("ales") {
        "Order"
    } else if lower.ends_with("aceae") {
        "Family"
    } else {
        "Genus"
    }
}

fn taxon_rank(taxon: &Taxon) -> &str {
    taxon
        .rank
        .as_deref()
        .unwrap_or_else(|| guess_rank(&taxon.text_name))
}

/// Resolved lookup flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Closure {
    include_synonyms: bool,
    include_subtaxa: bool,
    include_immediate_subtaxa: bool,
    exclude_original_names: bool,
    exclude_consensus: bool,
    /// `None` when not given; an explicit `false` changes `exclude_consensus`.
    include_all_name_proposals: Option<bool>,
}

impl Closure {
    fn from_map(map: &crate::ParamMap) -> Closure {
        let on = |key: &str| map.get(key).and_then(ParamValue::as_bool).unwrap_or(false);
        Closure {
            include_synonyms: on("include_synonyms"),
            include_subtaxa: on("include_subtaxa"),
            include_immediate_subtaxa: on("include_immediate_subtaxa"),
            exclude_original_names: on("exclude_original_names"),
            exclude_consensus: on("exclude_consensus"),
            include_all_name_proposals: map.get("include_all_name_proposals").and_then(ParamValue::as_bool),
        }
    }

    fn all_proposals(&self) -> bool {
        self.include_all_name_proposals == Some(true)
    }
}

struct NameSet<'a> {
    cx: &'a FilterCx<'a>,
    taxa: BTreeMap<Id, Taxon>,
}

impl<'a> NameSet<'a> {
    fn add(&mut self, found: Vec<Taxon>) -> bool {
        let before = self.taxa.len();
        for taxon in found {
            self.taxa.entry(taxon.id).or_insert(taxon);
        }
        self.taxa.len() > before
    }

    fn ids(&self) -> BTreeSet<Id> {
        self.taxa.keys().copied().collect()
    }

    fn originals(&mut self, ids: Vec<Id>, keys: Vec<&str>) -> Result<()> {
        let by_key = keys.into_iter().flat_map(|key| {
            [
                Predicate::eq("search_name", key),
                Predicate::eq("text_name", key),
            ]
        });
        let found = self
            .cx
            .directory
            .taxa_where(&Predicate::or(std::iter::once(Predicate::in_set("id", ids)).chain(by_key)))?;

        let spellings: BTreeSet<Id> = found.iter().filter_map(|t| t.correct_spelling_id).collect();
        self.add(found);
        if !spellings.is_empty() {
            let correct = self.cx.directory.taxa_where(&Predicate::in_set("id", spellings))?;
            self.add(correct);
        }
        Ok(())
    }

    fn synonyms(&mut self) -> Result<bool> {
        let groups: BTreeSet<Id> = self.taxa.values().filter_map(|t| t.synonym_id).collect();
        if groups.is_empty() {
            return Ok(false);
        }
        let found = self.cx.directory.taxa_where(&Predicate::in_set("synonym_id", groups))?;
        Ok(self.add(found))
    }

    /// Adds children, either every descendant or the next level down.
    fn subtaxa(&mut self, immediate: bool) -> Result<bool> {
        let (higher, lower): (Vec<&Taxon>, Vec<&Taxon>) =
            self.taxa.values().partition(|t| is_above_genus(taxon_rank(t)));

        let mut parts = Vec::new();
        if !higher.is_empty() {
            let names = alternation(&higher);
            parts.push(if immediate {
                Predicate::and([
                    Predicate::regex("classification", format!(": _({names})_\\s*$")),
                    Predicate::not(Predicate::like("text_name", "% %")),
                ])
            } else {
                Predicate::regex("classification", format!(": _({names})_"))
            });
        }
        if !lower.is_empty() {
            let names = alternation(&lower);
            parts.push(if immediate {
                Predicate::regex("text_name", format!("^({names}) [^ ]+( [^ ]+)?$"))
            } else {
                Predicate::regex("text_name", format!("^({names}) "))
            });
        }
        if parts.is_empty() {
            return Ok(false);
        }
        let found = self.cx.directory.taxa_where(&Predicate::or(parts))?;
        Ok(self.add(found))
    }
}

fn alternation(group: &[&Taxon]) -> String {
    group
        .iter()
        .map(|t| regex::escape(&t.text_name))
        .collect::<Vec<_>>()
        .join("|")
}

/// Expands a normalized lookup into name ids.
fn resolve(cx: &FilterCx<'_>, lookup: &[ParamValue], closure: Closure) -> Result<Vec<Id>> {
    let mut ids = Vec::new();
    let mut keys = Vec::new();
    for value in lookup {
        match value {
            ParamValue::Int(id) => ids.push(*id),
            ParamValue::Text(key) => keys.push(key.trim()),
            other => return Err(QueryError::shape("names", "record ids or names", other)),
        }
    }

    let mut set = NameSet {
        cx,
        taxa: BTreeMap::new(),
    };
    set.originals(ids, keys)?;
    let originals = set.ids();

    if closure.include_synonyms {
        set.synonyms()?;
    }
    if closure.include_subtaxa || closure.include_immediate_subtaxa {
        let grew = set.subtaxa(!closure.include_subtaxa)?;
        if grew && closure.include_synonyms {
            set.synonyms()?;
        }
    }
    if closure.exclude_original_names {
        set.taxa.retain(|id, taxon| {
            !originals.contains(id) && !taxon.correct_spelling_id.is_some_and(|c| originals.contains(&c))
        });
    }

    tracing::debug!(
        originals = originals.len(),
        resolved = set.taxa.len(),
        ?closure,
        "resolved name lookup"
    );
    if set.taxa.is_empty() {
        return Err(QueryError::EmptyLookup { filter: "names" });
    }
    Ok(set.taxa.into_keys().collect())
}

/// `names`.
///
/// On observations the consensus name is matched unless the lookup asks for
/// every proposed name. `exclude_consensus` keeps observations where one of
/// the names was proposed but did not win. Refusing proposals outright while
/// excluding the consensus leaves nothing.
pub(super) fn names(cx: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let map = value
        .as_map()
        .ok_or_else(|| QueryError::shape(name.as_str(), "a name lookup", value))?;
    let lookup = map
        .get("lookup")
        .map(|l| list_value(name, l))
        .transpose()?
        .unwrap_or_default();
    let closure = Closure::from_map(map);

    let refused = closure.include_all_name_proposals == Some(false);
    if rt == RecordType::Observation && closure.exclude_consensus && refused {
        return Ok(Predicate::False);
    }
    let ids = resolve(cx, lookup, closure)?;

    Ok(match rt {
        RecordType::Name => Predicate::in_set("id", ids),
        RecordType::Observation if closure.all_proposals() || closure.exclude_consensus => {
            let namings = schema::association(rt, "namings").ok_or(QueryError::NotApplicable {
                record_type: rt,
                name: name.as_str(),
            })?;
            let proposed = Predicate::exists(namings, Predicate::in_set("name_id", ids.iter().copied()));
            if closure.exclude_consensus {
                Predicate::and([proposed, Predicate::not(Predicate::in_set("name_id", ids))])
            } else {
                proposed
            }
        }
        _ => Predicate::in_set("name_id", ids),
    })
}

/// `misspellings`: `no`, `either` or `only`.
pub(super) fn misspellings(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    match text_value(name, value)? {
        "no" => Ok(Predicate::is_null("correct_spelling_id")),
        "only" => Ok(Predicate::not_null("correct_spelling_id")),
        "either" => Ok(Predicate::True),
        _ => Err(QueryError::shape(name.as_str(), "no, either or only", value)),
    }
}

/// `rank`: a rank, or every rank between two.
pub(super) fn rank(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let fail = || QueryError::shape(name.as_str(), "a rank or a pair of ranks", value);
    let (low, high) = match list_value(name, value)? {
        [low, high] => (text_value(name, low)?, text_value(name, high)?),
        _ => return Err(fail()),
    };
    let low = rank_index(low).ok_or_else(fail)?;
    let high = rank_index(high).ok_or_else(fail)?;
    let (low, high) = (low.min(high), low.max(high));
    Ok(Predicate::in_set("rank", RANKS[low..=high].iter().copied()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_above_genus() {
        assert!(is_above_genus("Family"));
        assert!(is_above_genus("phylum"));
        assert!(!is_above_genus("Genus"));
        assert!(!is_above_genus("Species"));
        assert!(!is_above_genus("Group"));
        assert!(!is_above_genus("nonsense"));
    }

    #[test]
    fn guesses() {
        assert_eq!(guess_rank("Agaricaceae"), "Family");
        assert_eq!(guess_rank("Agaricales"), "Order");
        assert_eq!(guess_rank("Agaricomycetes"), "Class");
        assert_eq!(guess_rank("Basidiomycota"), "Phylum");
        assert_eq!(guess_rank("Fungi"), "Kingdom");
        assert_eq!(guess_rank("Agaricus"), "Genus");
        assert_eq!(guess_rank("Agaricus campestris"), "Species");
    }

    #[test]
    fn closure_reads_only_true_flags() {
        let map = crate::params! { "include_synonyms" => true, "exclude_consensus" => false };
        let closure = Closure::from_map(&map);
        assert!(closure.include_synonyms);
        assert!(!closure.exclude_consensus);
        assert_eq!(
            Closure::from_map(&crate::ParamMap::new()),
            Closure::default()
        );
    }

    #[test]
    fn closure_tells_refused_proposals_from_unset() {
        let unset = Closure::from_map(&crate::params! { "exclude_consensus" => true });
        assert_eq!(unset.include_all_name_proposals, None);
        assert!(!unset.all_proposals());

        let refused = Closure::from_map(&crate::params! {
            "exclude_consensus" => true,
            "include_all_name_proposals" => false,
        });
        assert_eq!(refused.include_all_name_proposals, Some(false));
        assert!(!refused.all_proposals());
    }
}

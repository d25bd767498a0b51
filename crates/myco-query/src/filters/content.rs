//! Content filters shared across record types: place, taxon and lifeform.

use myco_pattern::escape_like;

use super::common::{bool_value, list_value, text_value};
use super::names::{guess_rank, is_above_genus};
use super::{FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::{self, RecordType};

/// Countries each continent name expands to, as they are written in place
/// names.
pub const CONTINENTS: &[(&str, &[&str])] = &[
    (
        "Africa",
        &[
            "Algeria", "Angola", "Botswana", "Cameroon", "Democratic Republic of the Congo", "Egypt",
            "Ethiopia", "Gabon", "Ghana", "Kenya", "Madagascar", "Malawi", "Morocco", "Mozambique",
            "Namibia", "Nigeria", "Republic of the Congo", "Rwanda", "Senegal", "South Africa",
            "Tanzania", "Tunisia", "Uganda", "Zambia", "Zimbabwe",
        ],
    ),
    (
        "Asia",
        &[
            "Bangladesh", "Bhutan", "Cambodia", "China", "India", "Indonesia", "Iran", "Israel",
            "Japan", "Kazakhstan", "Laos", "Malaysia", "Mongolia", "Myanmar", "Nepal", "Pakistan",
            "Philippines", "Russia", "Singapore", "South Korea", "Sri Lanka", "Taiwan", "Thailand",
            "Turkey", "Vietnam",
        ],
    ),
    (
        "Europe",
        &[
            "Austria", "Belgium", "Bulgaria", "Croatia", "Czech Republic", "Denmark", "Estonia",
            "Finland", "France", "Germany", "Greece", "Hungary", "Iceland", "Ireland", "Italy",
            "Latvia", "Lithuania", "Netherlands", "Norway", "Poland", "Portugal", "Romania",
            "Slovakia", "Slovenia", "Spain", "Sweden", "Switzerland", "Ukraine", "United Kingdom",
        ],
    ),
    (
        "North America",
        &[
            "Belize", "Canada", "Costa Rica", "Cuba", "Dominican Republic", "El Salvador",
            "Greenland", "Guatemala", "Haiti", "Honduras", "Jamaica", "Mexico", "Nicaragua",
            "Panama", "Puerto Rico", "USA",
        ],
    ),
    (
        "Oceania",
        &["Australia", "Fiji", "New Caledonia", "New Zealand", "Papua New Guinea", "Samoa", "Vanuatu"],
    ),
    (
        "South America",
        &[
            "Argentina", "Bolivia", "Brazil", "Chile", "Colombia", "Ecuador", "French Guiana",
            "Guyana", "Paraguay", "Peru", "Suriname", "Uruguay", "Venezuela",
        ],
    ),
    ("Antarctica", &["Antarctica"]),
];

fn continent(place: &str) -> Option<&'static [&'static str]> {
    CONTINENTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(place))
        .map(|(_, countries)| *countries)
}

fn is_country(place: &str) -> bool {
    CONTINENTS
        .iter()
        .flat_map(|(_, countries)| countries.iter())
        .any(|country| country.eq_ignore_ascii_case(place))
}

fn is_known_region(place: &str) -> bool {
    continent(place).is_some() || is_country(place)
}

/// Stored-name spellings a region may match, most general component last.
///
/// Short names are order-insensitive: every arrangement ending in a known
/// country is tried, or every arrangement when none does. Longer names are
/// reversed if written most-general-first.
pub fn canonical_region(place: &str) -> Vec<String> {
    let parts: Vec<&str> = place
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut candidates: Vec<String> = if parts.len() <= 3 {
        let arrangements = permutations(&parts);
        let anchored: Vec<_> = arrangements
            .iter()
            .filter(|a| a.last().is_some_and(|last| is_known_region(last)))
            .cloned()
            .collect();
        let chosen = if anchored.is_empty() { arrangements } else { anchored };
        chosen.into_iter().map(|a| a.join(", ")).collect()
    } else if parts.first().is_some_and(|first| is_known_region(first)) {
        let mut reversed = parts.clone();
        reversed.reverse();
        vec![reversed.join(", ")]
    } else {
        vec![parts.join(", ")]
    };
    candidates.sort();
    candidates.dedup();
    candidates
}

/// Every ordering of `items`.
fn permutations<'a>(items: &[&'a str]) -> Vec<Vec<&'a str>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, head) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, *head);
            out.push(tail);
        }
    }
    out
}

fn region_column(rt: RecordType) -> &'static str {
    match rt {
        RecordType::Location => "name",
        _ => "where",
    }
}

fn one_region(column: &'static str, place: &str) -> Predicate {
    if let Some(countries) = continent(place.trim()) {
        let alternatives: Vec<String> = countries.iter().map(|c| regex::escape(c)).collect();
        return Predicate::regex(column, format!("(^|, )({})$", alternatives.join("|")));
    }
    Predicate::or(canonical_region(place).into_iter().flat_map(|candidate| {
        [
            Predicate::like(column, format!("%, {}", escape_like(&candidate))),
            Predicate::eq(column, candidate),
        ]
    }))
}

/// `region`: places within any of the named regions.
pub(super) fn region(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let column = region_column(rt);
    let places = list_value(name, value)?
        .iter()
        .map(|v| text_value(name, v))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::or(places.into_iter().map(|place| one_region(column, place))))
}

/// `clade`: names in any of the given taxa.
pub(super) fn clade(cx: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let mut parts = Vec::new();
    for taxon in list_value(name, value)? {
        let taxon = text_value(name, taxon)?.trim();
        if taxon.is_empty() {
            continue;
        }
        let known = cx.directory.taxa_where(&Predicate::or([
            Predicate::eq("text_name", taxon),
            Predicate::eq("search_name", taxon),
        ]))?;
        let rank = known
            .iter()
            .find_map(|t| t.rank.clone())
            .unwrap_or_else(|| guess_rank(taxon).to_string());

        parts.push(if is_above_genus(&rank) {
            Predicate::or([
                Predicate::eq("text_name", taxon),
                Predicate::regex("classification", format!("{rank}: _{}_", regex::escape(taxon))),
            ])
        } else {
            Predicate::or([
                Predicate::eq("text_name", taxon),
                Predicate::like("text_name", format!("{} %", escape_like(taxon))),
            ])
        });
    }
    Ok(Predicate::or(parts))
}

/// `lichen`: lifeform includes "lichen", or is clear of it.
pub(super) fn lichen(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    Ok(if bool_value(name, value)? {
        Predicate::like("lifeform", "%lichen%")
    } else {
        Predicate::not(Predicate::like("lifeform", "% lichen %"))
    })
}

pub(super) fn has_images(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let wanted = bool_value(name, value)?;
    let present = match rt {
        RecordType::Observation => Predicate::not_null("thumb_image_id"),
        _ => {
            let images = schema::association(rt, "images").ok_or(QueryError::NotApplicable {
                record_type: rt,
                name: name.as_str(),
            })?;
            Predicate::exists(images, Predicate::True)
        }
    };
    Ok(if wanted { present } else { Predicate::not(present) })
}

pub(super) fn has_specimen(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    Ok(Predicate::eq("specimen", bool_value(name, value)?))
}

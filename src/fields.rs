//! Canonical schema and field resolution across historical form versions
//!
//! The consultation form was re-published several times. Each canonical field
//! lists the source keys it has been stored under, newest first:
//!
//! 1. grouped keys of the current form (`intro/org_type`, `bloc_a/a1_service_top1`)
//! 2. grouped keys of the first form (`bloc_a/service_top1`) and flat keys
//! 3. `*_label` keys of already-cleaned exports fed back through the pipeline

use serde_json::Value;
use std::borrow::Borrow;

use crate::error::SchemaDrift;
use crate::types::RawRecord;
use crate::utils::value_text;

/// How a canonical field is turned into display text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text, trimmed
    Text,
    /// Timestamp or date, cut to `YYYY-MM-DD`
    Date,
    /// One code from the given label domain
    Single(&'static str),
    /// Several codes from the given label domain
    Multi(&'static str),
}

impl FieldKind {
    pub fn domain(&self) -> Option<&'static str> {
        match self {
            FieldKind::Single(d) | FieldKind::Multi(d) => Some(d),
            FieldKind::Text | FieldKind::Date => None,
        }
    }
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub variants: &'static [&'static str],
}

const fn field(
    name: &'static str,
    kind: FieldKind,
    variants: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        variants,
    }
}

use FieldKind::{Date, Multi, Single, Text};

/// Field used to slice summaries by respondent organisation type
pub const GROUP_FIELD: &str = "org_type";

pub const SCHEMA: &[FieldSpec] = &[
    // Intro
    field(
        "submission_date",
        Date,
        &["intro/date_interview", "date_interview", "_submission_time", "start"],
    ),
    field("organisation", Text, &["intro/organisation", "org_name", "organisation"]),
    field(
        "org_type",
        Single("org_type"),
        &["intro/org_type", "org_type", "org_type_label"],
    ),
    field("cluster", Single("cluster"), &["intro/cluster", "cluster", "cluster_label"]),
    field(
        "province",
        Single("province"),
        &["intro/province", "province_base", "province_label", "province_base_label"],
    ),
    field(
        "admin2",
        Text,
        &["intro/admin2", "territoire_base", "admin2", "territoire_base_label"],
    ),
    field(
        "other_provinces",
        Multi("province"),
        &["intro/other_provinces", "other_provinces", "other_provinces_label"],
    ),
    field("consent", Single("consent"), &["intro/consent", "consent", "consent_label"]),
    // Bloc A: services
    field(
        "service_top1",
        Single("service"),
        &["bloc_a/a1_service_top1", "bloc_a/service_top1", "service_top1_label"],
    ),
    field(
        "service_top2",
        Single("service"),
        &["bloc_a/a1_service_top2", "bloc_a/service_top2", "service_top2_label"],
    ),
    field(
        "service_top3",
        Single("service"),
        &["bloc_a/a1_service_top3", "bloc_a/service_top3", "service_top3_label"],
    ),
    field("a1_where", Text, &["bloc_a/a1_where", "a1_where"]),
    field("a2_where", Text, &["bloc_a/a2_where", "a2_where"]),
    field(
        "referral_gravity",
        Single("gravite"),
        &[
            "bloc_a/a2_gravity",
            "bloc_a/rupture_gravite",
            "referral_gravity_label",
            "rupture_gravite_label",
        ],
    ),
    field(
        "restore_time",
        Single("restore_time"),
        &["bloc_a/a3_restore_time", "restore_time_label"],
    ),
    field(
        "approaches",
        Multi("approaches"),
        &["bloc_a/a4_approaches", "approaches_label"],
    ),
    field(
        "approaches_narrative",
        Text,
        &["bloc_a/approches_efficaces", "approches_efficaces"],
    ),
    // Bloc B: additionality
    field(
        "additionality",
        Multi("additionality"),
        &["bloc_b/b1_additionality", "additionality_label"],
    ),
    field(
        "additionality_explain",
        Text,
        &["bloc_b/b1_explain", "bloc_b/valeur_ajoutee", "b1_explain", "valeur_ajoutee"],
    ),
    field(
        "innovation_level",
        Single("innovation"),
        &["bloc_b/b2_innovation", "innovation_level_label"],
    ),
    field("innovation_explain", Text, &["bloc_b/b2_explain", "b2_explain"]),
    field(
        "theory_of_change",
        Text,
        &["bloc_b/b3_toc", "bloc_b/effet_systemique", "toc", "effet_systemique"],
    ),
    // Bloc C: localisation
    field(
        "obstacles",
        Multi("obstacles_wlo"),
        &[
            "bloc_c/c1_obstacles",
            "bloc_c/obstacles_wlo",
            "obstacles_label",
            "obstacles_wlo_label",
        ],
    ),
    field(
        "solutions",
        Text,
        &["bloc_c/c1_solutions", "bloc_c/solutions_wlo", "c1_solutions", "solutions_wlo"],
    ),
    field(
        "governance",
        Multi("governance"),
        &["bloc_c/c2_governance", "governance_label"],
    ),
    field("capacity", Multi("capacity"), &["bloc_c/c3_capacity", "capacity_label"]),
    field("coordination", Text, &["bloc_c/c4_coordination", "c4_coordination"]),
    // Bloc D: targeting and accountability
    field(
        "priority_areas",
        Multi("province"),
        &[
            "bloc_d/d1_priority_areas",
            "bloc_d/provinces_prioritaires",
            "priority_areas_label",
            "provinces_prioritaires_label",
        ],
    ),
    field(
        "underserved",
        Multi("groupes"),
        &[
            "bloc_d/d2_underserved",
            "bloc_d/groupes_sous_servis",
            "underserved_label",
            "groupes_sous_servis_label",
        ],
    ),
    field("sadd", Text, &["bloc_d/d3_saddd", "saddd"]),
    field(
        "accountability",
        Multi("accountability"),
        &["bloc_d/d4_meca", "meca_label"],
    ),
    field(
        "feedback_channel",
        Single("feedback_channel"),
        &[
            "bloc_d/d5_feedback_channel",
            "bloc_d/mecanisme_feedback",
            "feedback_channel_label",
            "mecanisme_feedback",
        ],
    ),
    field("trust_plus", Text, &["bloc_d/d6_trust_plus", "trust_plus"]),
    field("trust_minus", Text, &["bloc_d/d7_trust_minus", "trust_minus"]),
    // Bloc E: risks
    field(
        "risks",
        Multi("risque"),
        &[
            "bloc_e/e1_risks",
            "bloc_e/risques_operationnels",
            "risks_label",
            "risques_operationnels_label",
        ],
    ),
    field(
        "mitigation",
        Text,
        &[
            "bloc_e/e1_mitigation",
            "bloc_e/mesures_mitigation",
            "e1_mitigation",
            "mesures_mitigation",
        ],
    ),
    field("funds", Multi("funds"), &["bloc_e/e2_funds", "funds_label"]),
    field("results", Text, &["bloc_e/e3_results", "e3_results"]),
    field(
        "critical_need",
        Single("critical_need"),
        &["bloc_e/e4_critical_need", "critical_need_label"],
    ),
    // Bloc F: digital
    field(
        "digital_advantages",
        Multi("digital_adv"),
        &[
            "bloc_f/f1_digital_adv",
            "bloc_f/avantages_digital",
            "digital_adv_label",
            "avantages_digital_label",
        ],
    ),
    field(
        "digital_limits",
        Multi("digital_lim"),
        &[
            "bloc_f/f2_digital_lim",
            "bloc_f/limites_digital",
            "digital_lim_label",
            "limites_digital_label",
        ],
    ),
    field(
        "digital_strengthen",
        Text,
        &["bloc_f/f3_strengthen", "bloc_f/apport_digital", "f1_strengthen", "apport_digital"],
    ),
    field(
        "un_support",
        Multi("un_support"),
        &["bloc_f/f4_un_support", "un_support_label"],
    ),
    field("un_support_details", Text, &["bloc_f/f5_details", "f2_details"]),
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    SCHEMA.iter().find(|spec| spec.name == name)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Raw value of the first source key that holds something for `canonical`.
///
/// Null and blank values count as absent so an empty new-style key does not hide
/// an old-style key that was filled in.
pub fn resolve_value<'r>(record: &'r RawRecord, canonical: &str) -> Option<&'r Value> {
    let spec = field_spec(canonical)?;
    spec.variants
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !is_blank(value))
}

/// Display text of `canonical`, or an empty string when no source key holds a value
pub fn resolve(record: &RawRecord, canonical: &str) -> String {
    match resolve_value(record, canonical) {
        Some(value) => {
            let text = value_text(value);
            match field_spec(canonical).map(|s| s.kind) {
                Some(Date) => text.chars().take(10).collect(),
                _ => text,
            }
        }
        None => String::new(),
    }
}

/// Canonical fields whose source keys appear in none of `records`.
///
/// An empty record set reports nothing.
pub fn detect_schema_drift<R: Borrow<RawRecord>>(records: &[R]) -> Vec<SchemaDrift> {
    if records.is_empty() {
        return Vec::new();
    }

    SCHEMA
        .iter()
        .filter(|spec| {
            !records.iter().any(|record| {
                let record: &RawRecord = record.borrow();
                spec.variants.iter().any(|key| record.contains_key(*key))
            })
        })
        .map(|spec| SchemaDrift {
            field: spec.name,
            variants: spec.variants.join(", "),
            records: records.len(),
        })
        .collect()
}

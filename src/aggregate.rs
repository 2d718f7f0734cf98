//! Frequency counts for the dashboard, globally and per organisation type

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};

use crate::fields::{field_spec, resolve, resolve_value, FieldKind};
use crate::labels::LabelTable;
use crate::multi::split_multi;
use crate::types::{AggregateCount, RawRecord, Summary};

/// Dashboard key -> canonical field, in the order the dashboard reads them.
///
/// Single or multi counting follows the field's kind in the schema.
pub const SUMMARY_FIELDS: &[(&str, &str)] = &[
    ("org_types", "org_type"),
    ("clusters", "cluster"),
    ("province_base", "province"),
    ("other_provinces", "other_provinces"),
    ("top_service_1", "service_top1"),
    ("top_service_2", "service_top2"),
    ("top_service_3", "service_top3"),
    ("referral_gravity", "referral_gravity"),
    ("restore_time", "restore_time"),
    ("approaches", "approaches"),
    ("additionality", "additionality"),
    ("innovation_level", "innovation_level"),
    ("obstacles_wlo", "obstacles"),
    ("governance_mechanisms", "governance"),
    ("capacity_needs", "capacity"),
    ("priority_areas", "priority_areas"),
    ("underserved_groups", "underserved"),
    ("accountability_mechanisms", "accountability"),
    ("feedback_channel", "feedback_channel"),
    ("operational_risks", "risks"),
    ("funds_leverage", "funds"),
    ("critical_need", "critical_need"),
    ("digital_advantages", "digital_advantages"),
    ("digital_limits", "digital_limits"),
    ("un_support", "un_support"),
];

/// Counts over borrowed records against one label table
pub struct Aggregator<'a> {
    labels: &'a LabelTable,
}

impl<'a> Aggregator<'a> {
    pub fn new(labels: &'a LabelTable) -> Self {
        Self { labels }
    }

    fn label_of(&self, field: &str, code: &str) -> String {
        match field_spec(field).and_then(|spec| spec.kind.domain()) {
            Some(domain) => self.labels.labelize(domain, code),
            None => code.trim().to_string(),
        }
    }

    /// One label per record; records without a value are skipped.
    pub fn count_single<R: Borrow<RawRecord>>(&self, records: &[R], field: &str) -> AggregateCount {
        let mut tally: HashMap<String, u64> = HashMap::new();
        for record in records {
            let record: &RawRecord = record.borrow();
            let label = self.label_of(field, &resolve(record, field));
            if !label.is_empty() {
                *tally.entry(label).or_insert(0) += 1;
            }
        }
        AggregateCount::from_tally(tally)
    }

    /// Every selected token counts once, so a record picking three options adds three.
    pub fn count_multi<R: Borrow<RawRecord>>(&self, records: &[R], field: &str) -> AggregateCount {
        let mut tally: HashMap<String, u64> = HashMap::new();
        for record in records {
            let record: &RawRecord = record.borrow();
            let Some(value) = resolve_value(record, field) else {
                continue;
            };
            for token in split_multi(value) {
                let label = self.label_of(field, &token);
                if !label.is_empty() {
                    *tally.entry(label).or_insert(0) += 1;
                }
            }
        }
        AggregateCount::from_tally(tally)
    }

    pub fn build_summary<R: Borrow<RawRecord>>(&self, records: &[R]) -> Summary {
        let counts = SUMMARY_FIELDS
            .iter()
            .map(|(key, field)| {
                let count = match field_spec(field).map(|spec| spec.kind) {
                    Some(FieldKind::Multi(_)) => self.count_multi(records, field),
                    _ => self.count_single(records, field),
                };
                (*key, count)
            })
            .collect();

        Summary {
            total_responses: records.len(),
            counts,
        }
    }

    /// Partition records by the label of `group_field` and summarise each partition.
    ///
    /// Records without a group value form the `""` partition; nothing is dropped.
    pub fn partition<'r, R: Borrow<RawRecord>>(
        &self,
        records: &'r [R],
        group_field: &str,
    ) -> BTreeMap<String, Vec<&'r RawRecord>> {
        let mut groups: BTreeMap<String, Vec<&'r RawRecord>> = BTreeMap::new();
        for record in records {
            let record: &RawRecord = record.borrow();
            let label = self.label_of(group_field, &resolve(record, group_field));
            groups.entry(label).or_default().push(record);
        }
        groups
    }

    pub fn build_grouped<R: Borrow<RawRecord>>(
        &self,
        records: &[R],
        group_field: &str,
    ) -> BTreeMap<String, Summary> {
        self.partition(records, group_field)
            .into_iter()
            .map(|(label, members)| (label, self.build_summary(&members)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::GROUP_FIELD;
    use serde_json::{json, Value};

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn scenario() -> Vec<RawRecord> {
        vec![
            record(json!({"org_type": "wlo", "bloc_e/risques_operationnels": "insecurite donnees"})),
            record(json!({"org_type": "ong_nat", "bloc_e/risques_operationnels": ""})),
            record(json!({"org_type": "wlo", "bloc_e/risques_operationnels": "insecurite"})),
        ]
    }

    fn assert_sorted(count: &AggregateCount) {
        for pair in count.entries().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.1 >= b.1, "{:?} before {:?}", a, b);
            if a.1 == b.1 {
                assert!(a.0.to_lowercase() <= b.0.to_lowercase(), "{:?} before {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = scenario();

        let summary = agg.build_summary(&records);
        assert_eq!(summary.total_responses, 3);
        let risks = summary.get("operational_risks").unwrap();
        assert_eq!(
            risks.entries(),
            &[
                ("Insécurité".to_string(), 2),
                ("Risques liés aux données / confidentialité".to_string(), 1),
            ]
        );

        let grouped = agg.build_grouped(&records, GROUP_FIELD);
        assert_eq!(grouped.len(), 2);
        assert_eq!(
            grouped["Organisation conduite par des femmes"].total_responses,
            2
        );
        assert_eq!(grouped["ONG nationale"].total_responses, 1);
        assert!(grouped["ONG nationale"]
            .get("operational_risks")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_count_single_skips_empty_and_labelizes() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = vec![
            record(json!({"bloc_a/a1_service_top1": "ssr"})),
            record(json!({"bloc_a/service_top1": "ssr"})),
            record(json!({"bloc_a/a1_service_top1": "mhpss"})),
            record(json!({"bloc_a/a1_service_top1": ""})),
            record(json!({})),
        ];
        let counts = agg.count_single(&records, "service_top1");
        assert_eq!(
            counts.entries(),
            &[
                ("Services SSR".to_string(), 2),
                ("Soutien psychosocial".to_string(), 1),
            ]
        );
        assert!(counts.total() <= records.len() as u64);
    }

    #[test]
    fn test_count_multi_counts_every_token() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = vec![
            record(json!({"bloc_d/d2_underserved": "deplacees handicap survivantes_vbg"})),
            record(json!({"bloc_d/groupes_sous_servis": ["handicap"]})),
            record(json!({"underserved_label": "Femmes déplacées, Autre"})),
        ];
        let counts = agg.count_multi(&records, "underserved");
        assert_eq!(counts.total(), 6);
        assert_eq!(counts.get("Femmes en situation de handicap"), Some(2));
        assert_eq!(counts.get("Femmes déplacées"), Some(2));
        assert_eq!(counts.get("Autre"), Some(1));
        assert_sorted(&counts);
    }

    #[test]
    fn test_tie_break_is_case_insensitive_label_order() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = vec![
            record(json!({"intro/cluster": "protection"})),
            record(json!({"intro/cluster": "Abris"})),
            record(json!({"intro/cluster": "santé"})),
            record(json!({"intro/cluster": "Santé"})),
            record(json!({"intro/cluster": "santé"})),
        ];
        let counts = agg.count_single(&records, "cluster");
        let labels: Vec<&str> = counts.entries().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["santé", "Abris", "protection", "Santé"]);
        assert_sorted(&counts);
    }

    #[test]
    fn test_empty_group_is_its_own_partition() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = vec![
            record(json!({"org_type": "wlo"})),
            record(json!({"org_type": ""})),
            record(json!({})),
            record(json!({"intro/org_type": "Coopérative"})),
        ];
        let grouped = agg.build_grouped(&records, GROUP_FIELD);
        assert_eq!(grouped[""].total_responses, 2);
        assert_eq!(grouped["Coopérative"].total_responses, 1);

        let total: usize = grouped.values().map(|s| s.total_responses).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn test_partitions_are_disjoint_and_exhaustive() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = vec![
            record(json!({"id": 1, "org_type": "wlo"})),
            record(json!({"id": 2, "intro/org_type": "nngo"})),
            record(json!({"id": 3, "org_type_label": "ONG nationale"})),
            record(json!({"id": 4, "org_type": "agence_onu"})),
            record(json!({"id": 5})),
        ];
        let partitions = agg.partition(&records, GROUP_FIELD);

        let mut seen: Vec<i64> = partitions
            .values()
            .flatten()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(partitions["ONG nationale"].len(), 2);
    }

    #[test]
    fn test_summary_has_fixed_key_set() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let empty: Vec<RawRecord> = Vec::new();
        let summary = agg.build_summary(&empty);
        assert_eq!(summary.total_responses, 0);
        let keys: Vec<&str> = summary.counts.iter().map(|(k, _)| *k).collect();
        let expected: Vec<&str> = SUMMARY_FIELDS.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, expected);
        assert!(summary.counts.iter().all(|(_, c)| c.is_empty()));
    }

    #[test]
    fn test_summary_fields_exist_in_schema() {
        for (key, field) in SUMMARY_FIELDS {
            assert!(field_spec(field).is_some(), "{key} -> {field}");
        }
    }

    #[test]
    fn test_multi_totals_match_token_occurrences() {
        let labels = LabelTable::builtin();
        let agg = Aggregator::new(&labels);
        let records = vec![
            record(json!({"bloc_f/f1_digital_adv": "rapidite transparence"})),
            record(json!({"bloc_f/f1_digital_adv": "rapidite"})),
            record(json!({"bloc_f/f1_digital_adv": "inconnu autre rapidite"})),
        ];
        let tokens: usize = records
            .iter()
            .map(|r| split_multi(resolve_value(r, "digital_advantages").unwrap()).len())
            .sum();
        let summary = agg.build_summary(&records);
        let counts = summary.get("digital_advantages").unwrap();
        assert_eq!(counts.total(), tokens as u64);
        assert_eq!(counts.get("Suivi plus rapide"), Some(3));
        assert_eq!(counts.get("inconnu"), Some(1));
    }
}

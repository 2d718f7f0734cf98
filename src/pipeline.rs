//! Fetch -> normalize -> aggregate -> persist

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::error::{PipelineError, SchemaDrift};
use crate::fields::{detect_schema_drift, resolve, resolve_value, FieldKind, GROUP_FIELD, SCHEMA};
use crate::kobo::{PageSource, Paginator};
use crate::labels::LabelTable;
use crate::multi::split_multi;
use crate::output::{render_json, write_documents, DATA_FILE, RAW_FILE, RECORDS_FILE};
use crate::types::{AggregateDocument, CleanRecord, RawDump, RawRecord, RecordsDocument};

/// Both documents of one run plus the fields that matched nothing
#[derive(Debug)]
pub struct PipelineOutput {
    pub aggregate: AggregateDocument,
    pub records: RecordsDocument,
    pub drift: Vec<SchemaDrift>,
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One display record with every schema field, in schema order
pub fn normalize_record(record: &RawRecord, labels: &LabelTable) -> CleanRecord {
    let fields = SCHEMA
        .iter()
        .map(|spec| {
            let value = match spec.kind {
                FieldKind::Text | FieldKind::Date => resolve(record, spec.name),
                FieldKind::Single(domain) => labels.labelize(domain, &resolve(record, spec.name)),
                FieldKind::Multi(domain) => resolve_value(record, spec.name)
                    .map(|v| {
                        split_multi(v)
                            .iter()
                            .map(|token| labels.labelize(domain, token))
                            .filter(|label| !label.is_empty())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default(),
            };
            (spec.name, value)
        })
        .collect();
    CleanRecord { fields }
}

/// Pure transformation of a full record set into both output documents
pub fn process(raw: &[RawRecord], labels: &LabelTable, generated_at: &str) -> PipelineOutput {
    let records = raw.iter().map(|r| normalize_record(r, labels)).collect();

    let aggregator = Aggregator::new(labels);
    let summary = aggregator.build_summary(raw);
    let by_org_type = aggregator.build_grouped(raw, GROUP_FIELD);

    PipelineOutput {
        aggregate: AggregateDocument {
            generated_at: generated_at.to_string(),
            summary,
            by_org_type,
        },
        records: RecordsDocument {
            generated_at: generated_at.to_string(),
            records,
        },
        drift: detect_schema_drift(raw),
    }
}

/// Write `data.json` and `records.json` together
pub fn persist(output: &PipelineOutput, out_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let documents = [
        (RECORDS_FILE, render_json(RECORDS_FILE, &output.records)?),
        (DATA_FILE, render_json(DATA_FILE, &output.aggregate)?),
    ];
    write_documents(out_dir, &documents)
}

fn report(output: &PipelineOutput) {
    for drift in &output.drift {
        warn!(field = drift.field, "schema drift: {}", drift);
    }
    let summary = &output.aggregate.summary;
    for (key, count) in &summary.counts {
        debug!(field = *key, labels = count.entries().len(), selections = count.total(), "counted");
    }
    let no_org_types = summary.get("org_types").map(|c| c.is_empty()).unwrap_or(true);
    if summary.total_responses > 0 && no_org_types {
        warn!("no submission has an organisation type; by_org_type holds a single unnamed group");
    }
    info!(
        records = output.records.records.len(),
        org_types = output.aggregate.by_org_type.len(),
        "aggregated submissions"
    );
}

/// Full run: nothing is written unless every page was fetched
pub fn run<S: PageSource>(
    paginator: &Paginator<S>,
    entry_url: &str,
    labels: &LabelTable,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let raw = paginator.fetch_all(entry_url)?;
    let output = process(&raw, labels, &now_iso());
    report(&output);
    persist(&output, out_dir)
}

/// Fetch only, keeping the untouched submissions for later offline runs
pub fn fetch_raw<S: PageSource>(
    paginator: &Paginator<S>,
    entry_url: &str,
    out_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let results = paginator.fetch_all(entry_url)?;
    let dump = RawDump {
        generated_at: Some(now_iso()),
        count: Some(results.len() as u64),
        results,
    };
    let json = render_json(RAW_FILE, &dump)?;
    let mut written = write_documents(out_dir, &[(RAW_FILE, json)])?;
    Ok(written.remove(0))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInput {
    Dump(RawDump),
    Records(Vec<RawRecord>),
}

/// Submissions from a raw dump, a single API page, or a bare JSON array of records
pub fn load_raw(path: &Path) -> Result<Vec<RawRecord>, PipelineError> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::Input {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let input: RawInput = serde_json::from_str(&content).map_err(|e| PipelineError::Input {
        path: path.to_path_buf(),
        reason: format!("expected {{ \"results\": [...] }} or an array of records: {}", e),
    })?;
    Ok(match input {
        RawInput::Dump(dump) => dump.results,
        RawInput::Records(records) => records,
    })
}

/// Offline run from a file written by `fetch`
pub fn aggregate_file(
    input: &Path,
    labels: &LabelTable,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let raw = load_raw(input)?;
    info!(path = %input.display(), rows = raw.len(), "loaded raw submissions");
    let output = process(&raw, labels, &now_iso());
    report(&output);
    persist(&output, out_dir)
}

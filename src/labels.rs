//! Code -> display label resolution
//!
//! Labels come from a static table keyed by domain (`org_type`, `province`, ...).
//! Some domains were typed by hand in early form versions and hold free text
//! ("Organisation conduite par des femmes (WLO)", "Nord Kivu"); those are flagged
//! noisy and get a normalization pass plus alias rules before falling back to the
//! raw value.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::PipelineError;

/// Domains whose stored values are not reliably form codes
const NOISY_DOMAINS: &[&str] = &["org_type", "province"];

const BUILTIN_LABELS: &[(&str, &[(&str, &str)])] = &[
    (
        "org_type",
        &[
            ("wlo", "Organisation conduite par des femmes"),
            ("ong_nat", "ONG nationale"),
            ("ong_int", "ONG internationale"),
            ("agence_onu", "Agence des Nations Unies"),
            ("gouvernement", "Gouvernement / Autorité"),
            ("autre", "Autre"),
        ],
    ),
    (
        "province",
        &[
            ("bas_uele", "Bas-Uele"),
            ("equateur", "Équateur"),
            ("haut_katanga", "Haut-Katanga"),
            ("haut_lomami", "Haut-Lomami"),
            ("haut_uele", "Haut-Uele"),
            ("ituri", "Ituri"),
            ("kasai", "Kasaï"),
            ("kasai_central", "Kasaï-Central"),
            ("kasai_oriental", "Kasaï-Oriental"),
            ("kinshasa", "Kinshasa"),
            ("kongo_central", "Kongo Central"),
            ("kwango", "Kwango"),
            ("kwilu", "Kwilu"),
            ("lomami", "Lomami"),
            ("lualaba", "Lualaba"),
            ("mai_ndombe", "Mai-Ndombe"),
            ("maniema", "Maniema"),
            ("mongala", "Mongala"),
            ("nord_kivu", "Nord-Kivu"),
            ("nord_ubangi", "Nord-Ubangi"),
            ("sankuru", "Sankuru"),
            ("sud_kivu", "Sud-Kivu"),
            ("sud_ubangi", "Sud-Ubangi"),
            ("tanganyika", "Tanganyika"),
            ("tshopo", "Tshopo"),
            ("tshuapa", "Tshuapa"),
        ],
    ),
    (
        "service",
        &[
            ("ssr", "Services SSR"),
            ("clinique_72h", "Prise en charge clinique <72h"),
            ("mhpss", "Soutien psychosocial"),
            ("juridique", "Assistance juridique"),
            ("abri", "Hébergement sécurisé"),
        ],
    ),
    (
        "gravite",
        &[
            ("faible", "Faible"),
            ("moderee", "Modérée"),
            ("elevee", "Élevée"),
            ("critique", "Critique"),
        ],
    ),
    ("consent", &[("yes", "Oui"), ("no", "Non")]),
    (
        "groupes",
        &[
            ("adolescentes_10_14", "Adolescentes 10–14 ans"),
            ("adolescentes_15_19", "Adolescentes 15–19 ans"),
            ("deplacees", "Femmes déplacées"),
            ("cheffes_menage", "Femmes cheffes de ménage"),
            ("handicap", "Femmes en situation de handicap"),
            ("survivantes_vbg", "Survivantes de VBG"),
            ("autre", "Autre"),
        ],
    ),
    (
        "risque",
        &[
            ("insecurite", "Insécurité"),
            ("acces_limite", "Accès humanitaire limité"),
            ("ressources_humaines", "Manque de ressources humaines"),
            ("approvisionnement", "Rupture chaîne d’approvisionnement"),
            ("donnees", "Risques liés aux données / confidentialité"),
            ("autre", "Autre"),
        ],
    ),
    (
        "digital_adv",
        &[
            ("rapidite", "Suivi plus rapide"),
            ("transparence", "Transparence accrue"),
            ("donnees_desag", "Données désagrégées plus rapidement"),
            ("meilleur_ciblage", "Meilleur ciblage"),
            ("autre", "Autre"),
        ],
    ),
    (
        "digital_lim",
        &[
            ("connectivite", "Coupures réseau / électricité"),
            ("confidentialite", "Confidentialité"),
            ("exclusion", "Exclusion numérique"),
            ("cout", "Coûts de maintenance"),
            ("autre", "Autre"),
        ],
    ),
    (
        "obstacles_wlo",
        &[
            ("administratif", "Contraintes administratives"),
            ("fiduciaire", "Contraintes fiduciaires"),
            ("securite", "Problèmes de sécurité"),
            ("acces_info", "Accès limité à l’information"),
            ("capacite", "Capacités organisationnelles limitées"),
            ("autre", "Autre"),
        ],
    ),
];

/// Alias rule for a noisy domain, applied to the lower-cased raw value
struct Alias {
    code: &'static str,
    matches: fn(&str) -> bool,
}

fn is_national_ngo(s: &str) -> bool {
    matches!(
        s,
        "nngo" | "ong_nationale" | "ong nationale" | "ong nat" | "national ngo"
    )
}

fn is_international_ngo(s: &str) -> bool {
    matches!(
        s,
        "ingo" | "ong_internationale" | "ong internationale" | "international ngo"
    )
}

fn is_women_led(s: &str) -> bool {
    s.contains("wlo") || s.contains("organisation conduite par des femmes")
}

fn is_un_agency(s: &str) -> bool {
    s.contains("agence") && (s.contains("onu") || s.contains("nations unies"))
}

fn is_government(s: &str) -> bool {
    s.contains("gouvern") || s.contains("autorité")
}

const ORG_TYPE_ALIASES: &[Alias] = &[
    Alias { code: "ong_nat", matches: is_national_ngo },
    Alias { code: "ong_int", matches: is_international_ngo },
    Alias { code: "wlo", matches: is_women_led },
    Alias { code: "agence_onu", matches: is_un_agency },
    Alias { code: "gouvernement", matches: is_government },
];

fn aliases_for(domain: &str) -> &'static [Alias] {
    match domain {
        "org_type" => ORG_TYPE_ALIASES,
        _ => &[],
    }
}

/// Lower-case, turn `-` and spaces into `_`, drop everything outside `[a-z_]`.
///
/// "Nord-Kivu" -> "nord_kivu", "Mai Ndombe" -> "mai_ndombe".
pub fn normalize_code(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || *c == '_')
        .collect();

    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }
    out.trim_end_matches('_').to_string()
}

/// Read-only domain -> code -> label table
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct LabelTable {
    domains: BTreeMap<String, BTreeMap<String, String>>,
}

impl LabelTable {
    /// The labels of the consultation form
    pub fn builtin() -> Self {
        let domains = BUILTIN_LABELS
            .iter()
            .map(|(domain, entries)| {
                let codes = entries
                    .iter()
                    .map(|(code, label)| (code.to_string(), label.to_string()))
                    .collect();
                (domain.to_string(), codes)
            })
            .collect();
        Self { domains }
    }

    #[cfg(test)]
    pub fn from_domains(domains: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { domains }
    }

    /// Merge a `{ domain: { code: label } }` JSON file over this table. File entries win.
    pub fn with_overrides_file(mut self, path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let overrides: BTreeMap<String, BTreeMap<String, String>> =
            serde_json::from_str(&content).map_err(|e| PipelineError::Input {
                path: path.to_path_buf(),
                reason: format!("expected {{ domain: {{ code: label }} }}: {}", e),
            })?;

        for (domain, codes) in overrides {
            self.domains.entry(domain).or_default().extend(codes);
        }
        Ok(self)
    }

    pub fn domain(&self, domain: &str) -> Option<&BTreeMap<String, String>> {
        self.domains.get(domain)
    }

    /// Display label for `code` in `domain`.
    ///
    /// Never fails: unknown domains and unresolved codes come back unchanged (trimmed),
    /// and only an empty code yields an empty string.
    pub fn labelize(&self, domain: &str, code: &str) -> String {
        let code = code.trim();
        if code.is_empty() {
            return String::new();
        }

        let Some(table) = self.domains.get(domain) else {
            return code.to_string();
        };

        if let Some(label) = table.get(code) {
            return label.clone();
        }

        if !NOISY_DOMAINS.contains(&domain) {
            return code.to_string();
        }

        if let Some(label) = table.get(&normalize_code(code)) {
            return label.clone();
        }

        let lowered = code.to_lowercase();
        aliases_for(domain)
            .iter()
            .filter(|alias| (alias.matches)(&lowered))
            .find_map(|alias| table.get(alias.code).cloned())
            .unwrap_or_else(|| code.to_string())
    }
}

//! Export of verified keys into subscription files and reports

use crate::key::models::Verdict;
use crate::key::rank;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

/// Default subscription profile title
pub const DEFAULT_PROFILE_TITLE: &str = "VPN Keys";

/// Advertised quota in the subscription header (100 GB)
const SUBSCRIPTION_TOTAL_BYTES: u64 = 107_374_182_400;

/// Advertised expiry in the subscription header (2027-01-01 UTC)
const SUBSCRIPTION_EXPIRE_TS: u64 = 1_798_761_600;

/// Configuration for the exporter
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory the output files land in
    pub out_dir: PathBuf,
    /// Profile title written into subscription headers
    pub profile_title: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            profile_title: DEFAULT_PROFILE_TITLE.to_string(),
        }
    }
}

impl ExportConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output directory
    pub fn with_out_dir(mut self, dir: PathBuf) -> Self {
        self.out_dir = dir;
        self
    }

    /// Set the profile title
    pub fn with_profile_title(mut self, title: String) -> Self {
        self.profile_title = title;
        self
    }
}

#[derive(Debug, Serialize)]
struct ReportKey {
    name: String,
    country: String,
    country_code: String,
    flag: String,
    isp: String,
    latency_ms: u64,
    speed_kbps: f64,
    exit_ip: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct ReportCountry {
    name: String,
    flag: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    name: String,
    description: String,
    total_checked: usize,
    working_count: usize,
    timestamp: String,
    countries: BTreeMap<String, ReportCountry>,
    keys: Vec<ReportKey>,
}

/// Writes subscription files and the JSON report
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    /// Create a new exporter with default configuration
    pub fn new() -> Self {
        Self {
            config: ExportConfig::default(),
        }
    }

    /// Create a new exporter with custom configuration
    pub fn with_config(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Write every output file for one run
    ///
    /// An empty working set still produces empty subscription files so
    /// downstream consumers see the run happened.
    pub fn write_all(&self, working: &[Verdict], total_checked: usize) -> crate::Result<()> {
        fs::create_dir_all(&self.config.out_dir)?;

        if working.is_empty() {
            for file in ["keys.txt", "happ.txt", "happ_lite.txt"] {
                fs::write(self.config.out_dir.join(file), "")?;
            }
            return Ok(());
        }

        let plain = working
            .iter()
            .map(|verdict| verdict.key.clone())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(self.config.out_dir.join("keys.txt"), &plain)?;
        fs::write(
            self.config.out_dir.join("keys_base64.txt"),
            STANDARD.encode(&plain),
        )?;

        let renamed = rank::rename_keys(working);
        let renamed_plain = renamed.join("\n");
        fs::write(self.config.out_dir.join("keys_renamed.txt"), &renamed_plain)?;
        fs::write(
            self.config.out_dir.join("keys_renamed_base64.txt"),
            STANDARD.encode(&renamed_plain),
        )?;

        let report = self.build_report(working, &renamed, total_checked);
        fs::write(
            self.config.out_dir.join("report.json"),
            serde_json::to_string_pretty(&report)?,
        )?;

        let happ = Self::happ_document(&self.config.profile_title, &renamed);
        fs::write(self.config.out_dir.join("happ.txt"), &happ)?;
        fs::write(
            self.config.out_dir.join("happ_base64.txt"),
            STANDARD.encode(&happ),
        )?;

        let lite = rank::select_lite(working);
        let lite_renamed = rank::rename_keys(&lite);
        let lite_title = format!("{} Lite", self.config.profile_title);
        fs::write(
            self.config.out_dir.join("happ_lite.txt"),
            Self::happ_document(&lite_title, &lite_renamed),
        )?;

        self.write_country_files(working)?;

        Ok(())
    }

    fn build_report(&self, working: &[Verdict], renamed: &[String], total_checked: usize) -> Report {
        let mut countries: BTreeMap<String, ReportCountry> = BTreeMap::new();
        for verdict in working {
            let entry = countries
                .entry(verdict.country_code.clone())
                .or_insert_with(|| ReportCountry {
                    name: verdict.country.clone(),
                    flag: rank::country_flag(&verdict.country_code).to_string(),
                    count: 0,
                });
            entry.count += 1;
        }

        let keys = working
            .iter()
            .zip(renamed)
            .map(|(verdict, renamed_key)| ReportKey {
                name: display_name(renamed_key).to_string(),
                country: verdict.country.clone(),
                country_code: verdict.country_code.clone(),
                flag: rank::country_flag(&verdict.country_code).to_string(),
                isp: verdict.isp.clone(),
                latency_ms: verdict.latency_ms,
                speed_kbps: (verdict.speed_kbps * 10.0).round() / 10.0,
                exit_ip: verdict.exit_ip.clone(),
                key: verdict.key.clone(),
            })
            .collect();

        Report {
            name: self.config.profile_title.clone(),
            description: format!("Checked {} keys, {} working", total_checked, working.len()),
            total_checked,
            working_count: working.len(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            countries,
            keys,
        }
    }

    /// Render a subscription document with client header directives
    fn happ_document(title: &str, keys: &[String]) -> String {
        let announce = STANDARD.encode(format!("{} updated", title));
        let mut lines = vec![
            "#profile-update-interval: 1".to_string(),
            format!("#profile-title: {}", title),
            format!(
                "#subscription-userinfo: upload=0; download=0; total={}; expire={}",
                SUBSCRIPTION_TOTAL_BYTES, SUBSCRIPTION_EXPIRE_TS
            ),
            format!("#announce: base64:{}", announce),
            String::new(),
        ];
        lines.extend(keys.iter().cloned());

        let mut doc = lines.join("\n");
        doc.push('\n');
        doc
    }

    fn write_country_files(&self, working: &[Verdict]) -> crate::Result<()> {
        let dir = self.config.out_dir.join("countries");
        fs::create_dir_all(&dir)?;

        let mut by_code: BTreeMap<String, Vec<&Verdict>> = BTreeMap::new();
        for verdict in working {
            by_code
                .entry(verdict.country_code.clone())
                .or_default()
                .push(verdict);
        }

        for (code, group) in by_code {
            let country = group[0].country.clone();
            let flag = rank::country_flag(&code);

            let mut counters: HashMap<String, u32> = HashMap::new();
            let keys: Vec<String> = group
                .iter()
                .map(|verdict| {
                    let n = counters.entry(verdict.isp.clone()).or_insert(0);
                    *n += 1;
                    let name = format!("{} {} | {} {}", flag, country, verdict.isp, n);
                    rank::with_fragment(&verdict.key, &name)
                })
                .collect();

            let title = format!("{} {}", self.config.profile_title, country);
            let file = dir.join(format!("{}.txt", country.to_lowercase().replace(' ', "_")));
            fs::write(file, Self::happ_document(&title, &keys))?;
        }

        Ok(())
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Display name of a key, the fragment after the last '#'
fn display_name(key: &str) -> &str {
    key.rsplit_once('#').map_or(key, |(_, fragment)| fragment)
}

//! Ranking, naming and selection of working keys

use crate::key::models::Verdict;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Flag emoji per ISO country code
static COUNTRY_FLAGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("RU", "\u{1F1F7}\u{1F1FA}"),
        ("DE", "\u{1F1E9}\u{1F1EA}"),
        ("NL", "\u{1F1F3}\u{1F1F1}"),
        ("US", "\u{1F1FA}\u{1F1F8}"),
        ("GB", "\u{1F1EC}\u{1F1E7}"),
        ("FR", "\u{1F1EB}\u{1F1F7}"),
        ("FI", "\u{1F1EB}\u{1F1EE}"),
        ("SE", "\u{1F1F8}\u{1F1EA}"),
        ("NO", "\u{1F1F3}\u{1F1F4}"),
        ("PL", "\u{1F1F5}\u{1F1F1}"),
        ("UA", "\u{1F1FA}\u{1F1E6}"),
        ("KZ", "\u{1F1F0}\u{1F1FF}"),
        ("BY", "\u{1F1E7}\u{1F1FE}"),
        ("LT", "\u{1F1F1}\u{1F1F9}"),
        ("LV", "\u{1F1F1}\u{1F1FB}"),
        ("EE", "\u{1F1EA}\u{1F1EA}"),
        ("CZ", "\u{1F1E8}\u{1F1FF}"),
        ("AT", "\u{1F1E6}\u{1F1F9}"),
        ("CH", "\u{1F1E8}\u{1F1ED}"),
        ("IT", "\u{1F1EE}\u{1F1F9}"),
        ("ES", "\u{1F1EA}\u{1F1F8}"),
        ("PT", "\u{1F1F5}\u{1F1F9}"),
        ("GR", "\u{1F1EC}\u{1F1F7}"),
        ("TR", "\u{1F1F9}\u{1F1F7}"),
        ("IL", "\u{1F1EE}\u{1F1F1}"),
        ("AE", "\u{1F1E6}\u{1F1EA}"),
        ("SG", "\u{1F1F8}\u{1F1EC}"),
        ("JP", "\u{1F1EF}\u{1F1F5}"),
        ("KR", "\u{1F1F0}\u{1F1F7}"),
        ("HK", "\u{1F1ED}\u{1F1F0}"),
        ("TW", "\u{1F1F9}\u{1F1FC}"),
        ("AU", "\u{1F1E6}\u{1F1FA}"),
        ("CA", "\u{1F1E8}\u{1F1E6}"),
        ("BR", "\u{1F1E7}\u{1F1F7}"),
        ("IN", "\u{1F1EE}\u{1F1F3}"),
        ("AM", "\u{1F1E6}\u{1F1F2}"),
        ("GE", "\u{1F1EC}\u{1F1EA}"),
        ("MD", "\u{1F1F2}\u{1F1E9}"),
        ("RO", "\u{1F1F7}\u{1F1F4}"),
        ("BG", "\u{1F1E7}\u{1F1EC}"),
        ("HU", "\u{1F1ED}\u{1F1FA}"),
        ("SK", "\u{1F1F8}\u{1F1F0}"),
        ("RS", "\u{1F1F7}\u{1F1F8}"),
        ("HR", "\u{1F1ED}\u{1F1F7}"),
        ("SI", "\u{1F1F8}\u{1F1EE}"),
        ("IE", "\u{1F1EE}\u{1F1EA}"),
        ("BE", "\u{1F1E7}\u{1F1EA}"),
        ("LU", "\u{1F1F1}\u{1F1FA}"),
        ("DK", "\u{1F1E9}\u{1F1F0}"),
        ("IS", "\u{1F1EE}\u{1F1F8}"),
    ])
});

/// Display priority per country code, lower sorts first
static COUNTRY_PRIORITY: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("RU", 0),
        ("KZ", 1),
        ("BY", 2),
        ("UA", 3),
        ("AM", 4),
        ("GE", 5),
        ("MD", 6),
        ("DE", 10),
        ("NL", 11),
        ("FI", 12),
        ("SE", 13),
        ("NO", 14),
        ("PL", 15),
        ("FR", 16),
        ("GB", 17),
        ("LT", 20),
        ("LV", 21),
        ("EE", 22),
        ("AT", 30),
        ("CH", 31),
        ("BE", 32),
        ("LU", 33),
        ("DK", 34),
        ("IE", 35),
        ("CZ", 36),
        ("SK", 37),
        ("HU", 38),
        ("RO", 39),
        ("BG", 40),
        ("RS", 41),
        ("HR", 42),
        ("SI", 43),
        ("GR", 44),
        ("IT", 45),
        ("ES", 46),
        ("PT", 47),
        ("IS", 48),
        ("TR", 50),
        ("IL", 51),
        ("AE", 52),
        ("JP", 60),
        ("KR", 61),
        ("HK", 62),
        ("TW", 63),
        ("SG", 64),
        ("IN", 65),
        ("US", 70),
        ("CA", 71),
        ("BR", 72),
        ("AU", 80),
    ])
});

/// Priority for countries absent from the table
const DEFAULT_PRIORITY: u32 = 99;

/// Flag for countries absent from the table
const DEFAULT_FLAG: &str = "\u{1F30D}";

/// Maximum non-Russian keys in the lite selection
const LITE_MAX_OTHER: usize = 35;

/// Flag emoji for a country code
pub fn country_flag(code: &str) -> &'static str {
    COUNTRY_FLAGS.get(code).copied().unwrap_or(DEFAULT_FLAG)
}

/// Display priority for a country code, lower sorts first
pub fn country_priority(code: &str) -> u32 {
    COUNTRY_PRIORITY.get(code).copied().unwrap_or(DEFAULT_PRIORITY)
}

fn isp_sort_key(isp: &str) -> String {
    if isp.is_empty() || isp == "Unknown" {
        "zzz".to_string()
    } else {
        isp.to_lowercase()
    }
}

/// Sort verdicts for subscription output: country priority, then ISP, then latency
pub fn sort_for_display(verdicts: &mut [Verdict]) {
    verdicts.sort_by(|a, b| {
        let key_a = (
            country_priority(&a.country_code),
            isp_sort_key(&a.isp),
            a.latency_ms,
        );
        let key_b = (
            country_priority(&b.country_code),
            isp_sort_key(&b.isp),
            b.latency_ms,
        );
        key_a.cmp(&key_b)
    });
}

/// Sort verdicts by measured quality: lowest latency, then highest speed
pub fn sort_by_quality(verdicts: &mut [Verdict]) {
    verdicts.sort_by(|a, b| {
        a.latency_ms.cmp(&b.latency_ms).then_with(|| {
            b.speed_kbps
                .partial_cmp(&a.speed_kbps)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
}

/// Rewrite each key's fragment to a readable name
///
/// Keys sharing a country and ISP get numbered so subscription clients
/// never show duplicate entries.
pub fn rename_keys(verdicts: &[Verdict]) -> Vec<String> {
    let mut counters: HashMap<String, u32> = HashMap::new();

    verdicts
        .iter()
        .map(|verdict| {
            let group = format!("{}_{}", verdict.country_code, verdict.isp);
            let n = counters.entry(group).or_insert(0);
            *n += 1;

            let name = format!(
                "{} {} | {} {}",
                country_flag(&verdict.country_code),
                verdict.country,
                verdict.isp,
                n
            );
            with_fragment(&verdict.key, &name)
        })
        .collect()
}

/// Replace a key's fragment, or append one if it has none
pub fn with_fragment(key: &str, name: &str) -> String {
    let base = key.rsplit_once('#').map_or(key, |(base, _)| base);
    format!("{}#{}", base, name)
}

/// Pick a small subscription: every Russian key plus the best key per ISP
/// and exit IP elsewhere, capped at [`LITE_MAX_OTHER`] non-Russian entries
pub fn select_lite(verdicts: &[Verdict]) -> Vec<Verdict> {
    let mut selected: Vec<Verdict> = verdicts
        .iter()
        .filter(|verdict| verdict.country_code == "RU")
        .cloned()
        .collect();

    let mut others: Vec<Verdict> = verdicts
        .iter()
        .filter(|verdict| verdict.country_code != "RU")
        .cloned()
        .collect();
    sort_by_quality(&mut others);

    let mut used_isps: HashSet<String> = HashSet::new();
    let mut used_ips: HashSet<String> = HashSet::new();
    let mut picked = 0;

    for verdict in others {
        if picked >= LITE_MAX_OTHER {
            break;
        }
        if used_isps.contains(&verdict.isp) {
            continue;
        }
        if !verdict.exit_ip.is_empty() && used_ips.contains(&verdict.exit_ip) {
            continue;
        }
        used_isps.insert(verdict.isp.clone());
        if !verdict.exit_ip.is_empty() {
            used_ips.insert(verdict.exit_ip.clone());
        }
        selected.push(verdict);
        picked += 1;
    }

    sort_for_display(&mut selected);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(code: &str, country: &str, isp: &str, latency_ms: u64, speed_kbps: f64) -> Verdict {
        let mut v = Verdict::new(format!("vless://id@{}.example.com:443#old", isp.to_lowercase()));
        v.country_code = code.to_string();
        v.country = country.to_string();
        v.isp = isp.to_string();
        v.latency_ms = latency_ms;
        v.speed_kbps = speed_kbps;
        v
    }

    #[test]
    fn test_country_flag_lookup() {
        assert_eq!(country_flag("RU"), "\u{1F1F7}\u{1F1FA}");
        assert_eq!(country_flag("DE"), "\u{1F1E9}\u{1F1EA}");
        assert_eq!(country_flag("ZZ"), DEFAULT_FLAG);
    }

    #[test]
    fn test_country_priority_lookup() {
        assert_eq!(country_priority("RU"), 0);
        assert_eq!(country_priority("DE"), 10);
        assert!(country_priority("US") > country_priority("NL"));
        assert_eq!(country_priority("ZZ"), DEFAULT_PRIORITY);
    }

    #[test]
    fn test_sort_for_display_orders_by_country_isp_latency() {
        let mut verdicts = vec![
            verdict("US", "United States", "Alpha", 10, 0.0),
            verdict("DE", "Germany", "Beta", 50, 0.0),
            verdict("DE", "Germany", "Beta", 20, 0.0),
            verdict("DE", "Germany", "Alpha", 90, 0.0),
        ];
        sort_for_display(&mut verdicts);

        assert_eq!(verdicts[0].isp, "Alpha");
        assert_eq!(verdicts[0].country_code, "DE");
        assert_eq!(verdicts[1].latency_ms, 20);
        assert_eq!(verdicts[2].latency_ms, 50);
        assert_eq!(verdicts[3].country_code, "US");
    }

    #[test]
    fn test_sort_by_quality_prefers_low_latency_then_speed() {
        let mut verdicts = vec![
            verdict("DE", "Germany", "A", 100, 500.0),
            verdict("DE", "Germany", "B", 50, 10.0),
            verdict("DE", "Germany", "C", 50, 90.0),
        ];
        sort_by_quality(&mut verdicts);

        assert_eq!(verdicts[0].isp, "C");
        assert_eq!(verdicts[1].isp, "B");
        assert_eq!(verdicts[2].isp, "A");
    }

    #[test]
    fn test_rename_keys_numbers_duplicates() {
        let verdicts = vec![
            verdict("DE", "Germany", "Hetzner", 10, 0.0),
            verdict("DE", "Germany", "Hetzner", 20, 0.0),
            verdict("DE", "Germany", "Contabo", 30, 0.0),
        ];
        let renamed = rename_keys(&verdicts);

        assert!(renamed[0].ends_with("Hetzner 1"));
        assert!(renamed[1].ends_with("Hetzner 2"));
        assert!(renamed[2].ends_with("Contabo 1"));
        assert!(renamed[0].contains("Germany"));
    }

    #[test]
    fn test_with_fragment_replaces_existing() {
        assert_eq!(
            with_fragment("vless://id@host:443#old name", "new"),
            "vless://id@host:443#new"
        );
    }

    #[test]
    fn test_with_fragment_appends_when_missing() {
        assert_eq!(
            with_fragment("vless://id@host:443", "name"),
            "vless://id@host:443#name"
        );
    }

    #[test]
    fn test_select_lite_keeps_russia_and_dedupes_isps() {
        let mut ru1 = verdict("RU", "Russia", "MTS", 10, 0.0);
        ru1.exit_ip = "5.5.5.1".to_string();
        let mut ru2 = verdict("RU", "Russia", "MTS", 20, 0.0);
        ru2.exit_ip = "5.5.5.2".to_string();
        let mut de1 = verdict("DE", "Germany", "Hetzner", 30, 100.0);
        de1.exit_ip = "6.6.6.1".to_string();
        let mut de2 = verdict("DE", "Germany", "Hetzner", 15, 500.0);
        de2.exit_ip = "6.6.6.2".to_string();
        let mut nl = verdict("NL", "Netherlands", "KPN", 40, 50.0);
        nl.exit_ip = "7.7.7.1".to_string();

        let lite = select_lite(&[ru1, ru2, de1, de2, nl]);

        // both Russian keys survive, one Hetzner (the faster), one KPN
        assert_eq!(lite.len(), 4);
        assert_eq!(lite[0].country_code, "RU");
        assert_eq!(lite[1].country_code, "RU");
        let hetzner: Vec<_> = lite.iter().filter(|v| v.isp == "Hetzner").collect();
        assert_eq!(hetzner.len(), 1);
        assert_eq!(hetzner[0].latency_ms, 15);
    }

    #[test]
    fn test_select_lite_caps_other_countries() {
        let verdicts: Vec<Verdict> = (0..40)
            .map(|i| {
                let mut v = verdict("US", "United States", &format!("ISP{}", i), 10 + i, 0.0);
                v.exit_ip = format!("9.9.{}.1", i);
                v
            })
            .collect();

        let lite = select_lite(&verdicts);
        assert_eq!(lite.len(), LITE_MAX_OTHER);
    }
}

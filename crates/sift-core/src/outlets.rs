//! Outlet directory: canonical outlet names plus tier, region and paywall
//! facts for well-known news domains.
//!
//! - Canonicalisation strips `www.`/`m.`/`amp.` style prefixes, collapses
//!   regional TLD variants (`bbc.co.uk` → `bbc.com`) and folds subdomains of
//!   known outlets onto the outlet (`politics.theguardian.com` → `theguardian.com`).
//! - Facts come from a built-in seed, an optional JSON override file, and
//!   runtime promotions made by the discovery worker.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{LazyLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{ArticleRecord, PaywallStatus, SourceTier};
use crate::persist::{read_document, write_document};

const STRIPPED_PREFIXES: &[&str] = &["www.", "m.", "amp.", "mobile.", "edition.", "eu.", "uk."];

static ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("bbc.co.uk", "bbc.com"),
        ("theguardian.co.uk", "theguardian.com"),
        ("guardian.co.uk", "theguardian.com"),
        ("reuters.co.uk", "reuters.com"),
        ("cnn.co.uk", "cnn.com"),
        ("independent.ie", "independent.co.uk"),
        ("nytimes.co", "nytimes.com"),
        ("nyti.ms", "nytimes.com"),
        ("apnews.co", "apnews.com"),
        ("aljazeera.net", "aljazeera.com"),
        ("dw.de", "dw.com"),
        ("france24.fr", "france24.com"),
        ("ft.co.uk", "ft.com"),
        ("washingtonpost.co", "washingtonpost.com"),
        ("politico.eu", "politico.com"),
    ])
});

/// Directory facts about one outlet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutletInfo {
    pub tier: SourceTier,
    pub region: Option<String>,
    pub paywall: PaywallStatus,
}

impl OutletInfo {
    pub fn new(tier: SourceTier, region: &str, paywall: PaywallStatus) -> Self {
        Self {
            tier,
            region: Some(region.to_string()),
            paywall,
        }
    }
}

/// Canonical outlet for a hostname, before directory subdomain folding.
pub fn canonical_outlet(domain: &str) -> String {
    let mut host = domain.trim().trim_end_matches('.').to_lowercase();
    loop {
        match STRIPPED_PREFIXES.iter().find(|p| host.starts_with(*p)) {
            Some(prefix) if host.len() > prefix.len() + 3 => {
                host = host[prefix.len()..].to_string();
            }
            _ => break,
        }
    }
    if let Some(canon) = ALIASES.get(host.as_str()) {
        return canon.to_string();
    }
    // news.bbc.co.uk → bbc.com
    for (variant, canon) in ALIASES.iter() {
        if host.ends_with(&format!(".{variant}")) {
            return canon.to_string();
        }
    }
    host
}

#[derive(Default, Serialize, Deserialize)]
struct OverrideFile {
    #[serde(default)]
    outlets: HashMap<String, OverrideEntry>,
}

#[derive(Serialize, Deserialize)]
struct OverrideEntry {
    tier: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    #[serde(default)]
    paywall: PaywallStatus,
}

fn tier_number(tier: SourceTier) -> u8 {
    match tier {
        SourceTier::Tier1 => 1,
        SourceTier::Tier2 => 2,
        SourceTier::Tier3 => 3,
        SourceTier::Unknown => 0,
    }
}

/// Lookup table of outlet facts.
#[derive(Debug)]
pub struct OutletDirectory {
    outlets: HashMap<String, OutletInfo>,
    promoted: RwLock<HashMap<String, OutletInfo>>,
}

impl Default for OutletDirectory {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl OutletDirectory {
    /// Empty directory: every outlet is unknown.
    pub fn empty() -> Self {
        Self {
            outlets: HashMap::new(),
            promoted: RwLock::new(HashMap::new()),
        }
    }

    /// Built-in seed of widely syndicated outlets.
    pub fn default_seed() -> Self {
        use PaywallStatus::{Free, Hard, Metered};
        use SourceTier::{Tier1, Tier2, Tier3};

        let mut outlets = HashMap::new();
        for (domain, tier, region, paywall) in [
            ("apnews.com", Tier1, "us", Free),
            ("reuters.com", Tier1, "global", Free),
            ("bbc.com", Tier1, "uk", Free),
            ("nytimes.com", Tier1, "us", Metered),
            ("washingtonpost.com", Tier1, "us", Metered),
            ("wsj.com", Tier1, "us", Hard),
            ("ft.com", Tier1, "uk", Hard),
            ("bloomberg.com", Tier1, "us", Hard),
            ("economist.com", Tier1, "uk", Hard),
            ("theguardian.com", Tier1, "uk", Free),
            ("npr.org", Tier1, "us", Free),
            ("aljazeera.com", Tier2, "middle-east", Free),
            ("cnn.com", Tier2, "us", Free),
            ("nbcnews.com", Tier2, "us", Free),
            ("cbsnews.com", Tier2, "us", Free),
            ("abcnews.go.com", Tier2, "us", Free),
            ("politico.com", Tier2, "us", Metered),
            ("axios.com", Tier2, "us", Free),
            ("theatlantic.com", Tier2, "us", Metered),
            ("latimes.com", Tier2, "us", Metered),
            ("usatoday.com", Tier2, "us", Free),
            ("independent.co.uk", Tier2, "uk", Free),
            ("telegraph.co.uk", Tier2, "uk", Metered),
            ("dw.com", Tier2, "europe", Free),
            ("france24.com", Tier2, "europe", Free),
            ("lemonde.fr", Tier2, "europe", Metered),
            ("spiegel.de", Tier2, "europe", Metered),
            ("scmp.com", Tier2, "asia", Metered),
            ("japantimes.co.jp", Tier2, "asia", Metered),
            ("abc.net.au", Tier2, "oceania", Free),
            ("cbc.ca", Tier2, "americas", Free),
            ("theverge.com", Tier3, "us", Free),
            ("techcrunch.com", Tier3, "us", Free),
            ("arstechnica.com", Tier3, "us", Free),
            ("wired.com", Tier3, "us", Metered),
            ("vox.com", Tier3, "us", Free),
            ("foxnews.com", Tier3, "us", Free),
            ("nypost.com", Tier3, "us", Free),
            ("thehill.com", Tier3, "us", Free),
            ("businessinsider.com", Tier3, "us", Metered),
        ] {
            outlets.insert(domain.to_string(), OutletInfo::new(tier, region, paywall));
        }

        Self {
            outlets,
            promoted: RwLock::new(HashMap::new()),
        }
    }

    /// Merge outlet facts from a JSON file of the shape
    /// `{"outlets": {"example.com": {"tier": 2, "region": "us", "paywall": "free"}}}`.
    pub fn with_overrides(mut self, path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read outlet overrides {}: {e}",
                path.display()
            ))
        })?;
        let file: OverrideFile = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid outlet overrides {}: {e}",
                path.display()
            ))
        })?;
        for (domain, entry) in file.outlets {
            self.outlets.insert(
                canonical_outlet(&domain),
                OutletInfo {
                    tier: SourceTier::from_number(entry.tier),
                    region: entry.region,
                    paywall: entry.paywall,
                },
            );
        }
        Ok(self)
    }

    /// Canonical outlet, folding subdomains of known outlets onto the outlet.
    pub fn canonical(&self, domain: &str) -> String {
        let host = canonical_outlet(domain);
        if self.outlets.contains_key(&host) {
            return host;
        }
        let mut best: Option<&str> = None;
        for known in self.outlets.keys() {
            if host.ends_with(&format!(".{known}"))
                && best.is_none_or(|b| known.len() > b.len())
            {
                best = Some(known);
            }
        }
        best.map(str::to_string).unwrap_or(host)
    }

    pub fn lookup(&self, domain: &str) -> Option<OutletInfo> {
        let canon = self.canonical(domain);
        if let Some(info) = self.outlets.get(&canon) {
            return Some(info.clone());
        }
        self.promoted_read().get(&canon).cloned()
    }

    pub fn is_known(&self, domain: &str) -> bool {
        self.lookup(domain).is_some()
    }

    /// Register a discovered outlet. Returns false if it was already known.
    pub fn promote(&self, domain: &str, info: OutletInfo) -> bool {
        let canon = self.canonical(domain);
        if self.outlets.contains_key(&canon) {
            return false;
        }
        let mut promoted = self
            .promoted
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if promoted.contains_key(&canon) {
            return false;
        }
        tracing::info!(domain = %canon, tier = ?info.tier, "Promoted discovered outlet");
        promoted.insert(canon, info);
        true
    }

    pub fn promoted_count(&self) -> usize {
        self.promoted_read().len()
    }

    /// Write runtime promotions into the override file so the next process
    /// starts with them. Entries already in the file win. Returns how many
    /// outlets were added.
    pub fn save_promoted(&self, path: &Path) -> Result<usize, AppError> {
        let promoted = self.promoted_read();
        if promoted.is_empty() {
            return Ok(0);
        }
        let mut file: OverrideFile = read_document(path)?.unwrap_or_default();
        let mut added = 0;
        for (domain, info) in promoted.iter() {
            if file.outlets.contains_key(domain) {
                continue;
            }
            file.outlets.insert(
                domain.clone(),
                OverrideEntry {
                    tier: tier_number(info.tier),
                    region: info.region.clone(),
                    paywall: info.paywall,
                },
            );
            added += 1;
        }
        if added > 0 {
            write_document(path, &file)?;
        }
        Ok(added)
    }

    /// Fill in directory facts the provider could not supply.
    pub fn annotate(&self, record: &mut ArticleRecord) {
        let canon = self.canonical(&record.source_domain);
        record.source_domain = canon;
        if let Some(info) = self.lookup(&record.source_domain) {
            if record.source_tier == SourceTier::Unknown {
                record.source_tier = info.tier;
            }
            if record.source_region.is_none() {
                record.source_region = info.region;
            }
            record.paywall = info.paywall;
        }
    }

    fn promoted_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, OutletInfo>> {
        self.promoted
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

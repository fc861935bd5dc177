//! Cluster and instance name allocation
//!
//! Instance names have the form `<cluster>-<suffix>` where the suffix is six
//! random lowercase alphanumerics. Every name is a valid DNS label.

use crate::error::{ProvisionError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

/// DNS label accepted for cluster and instance names
pub const DNS_LABEL_PATTERN: &str = r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$";

/// Prefix put in front of cluster names
pub const CLUSTER_PREFIX: &str = "k8s-";

const MAX_LABEL_LEN: usize = 63;
const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_WORD_ATTEMPTS: usize = 100;

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(DNS_LABEL_PATTERN).unwrap());

/// Whether `name` is a valid DNS label
pub fn is_dns_label(name: &str) -> bool {
    DNS_LABEL.is_match(name)
}

/// Whether `cluster` leaves room for the `-<suffix>` of its instances
fn fits_instance_suffix(cluster: &str) -> bool {
    is_dns_label(cluster) && cluster.len() + 1 + SUFFIX_LEN <= MAX_LABEL_LEN
}

/// How a provider derives cluster names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingScheme {
    /// Hyphen-delimited segments stripped off an existing host name in add-node mode
    pub strip_segments: usize,
    /// Prefix operator-supplied names with [`CLUSTER_PREFIX`] too
    pub prefix_supplied: bool,
}

impl NamingScheme {
    pub const AWS: NamingScheme = NamingScheme {
        strip_segments: 2,
        prefix_supplied: false,
    };

    pub const GCE: NamingScheme = NamingScheme {
        strip_segments: 2,
        prefix_supplied: false,
    };

    pub const OPENSTACK: NamingScheme = NamingScheme {
        strip_segments: 1,
        prefix_supplied: true,
    };
}

/// Where the cluster name comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingMode {
    /// New cluster, optionally with an operator-supplied name
    Fresh { cluster_name: Option<String> },
    /// Extend the cluster that `existing_host` belongs to
    AddNode { existing_host: String },
}

impl Default for NamingMode {
    fn default() -> Self {
        NamingMode::Fresh { cluster_name: None }
    }
}

/// Dictionary words used for generated cluster names
#[derive(Debug, Clone, Default)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    pub fn new(words: Vec<String>) -> Self {
        Self { words }
    }

    /// Load one word per line; an unreadable file yields an empty list.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let words: Vec<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(str::to_string)
                    .collect();
                tracing::debug!("Loaded {} words from {}", words.len(), path.display());
                Self { words }
            }
            Err(e) => {
                tracing::debug!("Word list {} unavailable: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }
}

/// Generates unique DNS-safe cluster and instance names
pub struct NameAllocator<R: Rng = StdRng> {
    rng: R,
    mode: NamingMode,
    words: WordList,
}

impl NameAllocator<StdRng> {
    pub fn new(words: WordList) -> Self {
        Self::with_rng(words, StdRng::from_entropy())
    }
}

impl<R: Rng> NameAllocator<R> {
    pub fn with_rng(words: WordList, rng: R) -> Self {
        Self {
            rng,
            mode: NamingMode::default(),
            words,
        }
    }

    pub fn with_mode(mut self, mode: NamingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_mode(&mut self, mode: NamingMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> &NamingMode {
        &self.mode
    }

    /// Random `[a-z0-9]{6}` token
    pub fn suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARS[self.rng.gen_range(0..SUFFIX_CHARS.len())] as char)
            .collect()
    }

    /// Resolve the cluster name for the current mode
    pub fn cluster_name(&mut self, scheme: NamingScheme) -> Result<String> {
        match self.mode.clone() {
            NamingMode::Fresh {
                cluster_name: Some(supplied),
            } => {
                let name = if scheme.prefix_supplied {
                    format!("{}{}", CLUSTER_PREFIX, supplied)
                } else {
                    supplied
                };
                if !fits_instance_suffix(&name) {
                    return Err(ProvisionError::config(format!(
                        "cluster name '{}' must match {} and be at most {} characters",
                        name,
                        DNS_LABEL_PATTERN,
                        MAX_LABEL_LEN - 1 - SUFFIX_LEN
                    )));
                }
                Ok(name)
            }
            NamingMode::Fresh { cluster_name: None } => Ok(self.generated_cluster_name()),
            NamingMode::AddNode { existing_host } => {
                recover_cluster_name(&existing_host, scheme.strip_segments)
            }
        }
    }

    /// `n` unique names under `cluster`
    pub fn instance_names(&mut self, cluster: &str, n: usize) -> Vec<String> {
        let mut seen = HashSet::with_capacity(n);
        let mut names = Vec::with_capacity(n);
        while names.len() < n {
            let name = format!("{}-{}", cluster, self.suffix());
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
        names
    }

    /// Resolve the cluster name and allocate `n` instance names under it
    pub fn allocate(&mut self, n: usize, scheme: NamingScheme) -> Result<Vec<String>> {
        let cluster = self.cluster_name(scheme)?;
        Ok(self.instance_names(&cluster, n))
    }

    fn generated_cluster_name(&mut self) -> String {
        if !self.words.is_empty() {
            for _ in 0..MAX_WORD_ATTEMPTS {
                let Some(word) = self.words.words.choose(&mut self.rng) else {
                    break;
                };
                let word = word.to_lowercase();
                let candidate = format!("{}{}", CLUSTER_PREFIX, word);
                if is_dns_label(&word) && fits_instance_suffix(&candidate) {
                    return candidate;
                }
            }
            tracing::debug!("No usable dictionary word found, falling back to a random token");
        }
        // "k8s-" followed by alphanumerics is always a valid label
        format!("{}{}", CLUSTER_PREFIX, self.suffix())
    }
}

/// Strip the last `strip_segments` hyphen-delimited segments off `hostname`
pub fn recover_cluster_name(hostname: &str, strip_segments: usize) -> Result<String> {
    let segments: Vec<&str> = hostname.split('-').collect();
    if segments.len() <= strip_segments {
        return Err(ProvisionError::config(format!(
            "cannot recover the cluster name from host '{}'",
            hostname
        )));
    }
    let cluster = segments[..segments.len() - strip_segments].join("-");
    if !fits_instance_suffix(&cluster) {
        return Err(ProvisionError::config(format!(
            "recovered cluster name '{}' from host '{}' is not a valid DNS label",
            cluster, hostname
        )));
    }
    Ok(cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(words: &[&str], seed: u64) -> NameAllocator<StdRng> {
        let words = WordList::new(words.iter().map(|w| w.to_string()).collect());
        NameAllocator::with_rng(words, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_generated_names_are_dns_labels() {
        let mut names = allocator(&["Aardvark", "o'clock", "zebra", "x"], 42);
        for _ in 0..10_000 {
            let cluster = names.cluster_name(NamingScheme::GCE).unwrap();
            assert!(is_dns_label(&cluster), "bad cluster name {}", cluster);
            let instance = names.instance_names(&cluster, 1).remove(0);
            assert!(is_dns_label(&instance), "bad instance name {}", instance);
        }
    }

    #[test]
    fn test_dictionary_words_are_lowercased() {
        let mut names = allocator(&["Zebra"], 1);
        assert_eq!(names.cluster_name(NamingScheme::AWS).unwrap(), "k8s-zebra");
    }

    #[test]
    fn test_unusable_words_fall_back_to_token() {
        let mut names = allocator(&["o'clock", "don't"], 3);
        let cluster = names.cluster_name(NamingScheme::AWS).unwrap();
        assert!(cluster.starts_with(CLUSTER_PREFIX));
        assert_eq!(cluster.len(), CLUSTER_PREFIX.len() + 6);
    }

    #[test]
    fn test_empty_word_list_falls_back_to_token() {
        let mut names = NameAllocator::with_rng(WordList::default(), StdRng::seed_from_u64(9));
        let cluster = names.cluster_name(NamingScheme::OPENSTACK).unwrap();
        assert!(is_dns_label(&cluster));
    }

    #[test]
    fn test_supplied_name() {
        let mut names = allocator(&[], 0).with_mode(NamingMode::Fresh {
            cluster_name: Some("prod".to_string()),
        });
        assert_eq!(names.cluster_name(NamingScheme::GCE).unwrap(), "prod");
        assert_eq!(
            names.cluster_name(NamingScheme::OPENSTACK).unwrap(),
            "k8s-prod"
        );
    }

    #[test]
    fn test_invalid_supplied_name() {
        let mut names = allocator(&[], 0).with_mode(NamingMode::Fresh {
            cluster_name: Some("Prod_Cluster".to_string()),
        });
        assert!(matches!(
            names.cluster_name(NamingScheme::AWS),
            Err(ProvisionError::Configuration(_))
        ));
    }

    #[test]
    fn test_instance_names_are_unique() {
        let mut names = allocator(&[], 5);
        let batch = names.instance_names("k8s-test", 500);
        let unique: HashSet<&String> = batch.iter().collect();
        assert_eq!(unique.len(), 500);
        assert!(batch.iter().all(|n| n.starts_with("k8s-test-")));
        assert!(batch.iter().all(|n| n.len() == "k8s-test-".len() + 6));
    }

    #[test]
    fn test_add_node_strips_two_segments_for_gce() {
        let mut names = allocator(&[], 0).with_mode(NamingMode::AddNode {
            existing_host: "k8s-walrus-a1b2c3".to_string(),
        });
        assert_eq!(names.cluster_name(NamingScheme::GCE).unwrap(), "k8s");
        let batch = names.allocate(2, NamingScheme::AWS).unwrap();
        assert!(batch.iter().all(|n| n.starts_with("k8s-")));
    }

    #[test]
    fn test_add_node_strips_one_segment_for_openstack() {
        let mut names = allocator(&[], 0).with_mode(NamingMode::AddNode {
            existing_host: "k8s-walrus-a1b2c3".to_string(),
        });
        assert_eq!(
            names.cluster_name(NamingScheme::OPENSTACK).unwrap(),
            "k8s-walrus"
        );
    }

    #[test]
    fn test_add_node_with_too_few_segments() {
        assert!(recover_cluster_name("node1", 1).is_err());
        assert!(recover_cluster_name("prod-a1b2c3", 2).is_err());
        assert_eq!(recover_cluster_name("prod-a1b2c3", 1).unwrap(), "prod");
    }

    #[test]
    fn test_dns_label_pattern() {
        assert!(is_dns_label("a"));
        assert!(is_dns_label("k8s-zebra-0a9z"));
        assert!(!is_dns_label("-k8s"));
        assert!(!is_dns_label("k8s-"));
        assert!(!is_dns_label("9lives"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn test_word_list_load_missing_file() {
        let words = WordList::load(Path::new("/nonexistent/kubeprov/words"));
        assert!(words.is_empty());
    }

    #[test]
    fn test_word_list_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words");
        std::fs::write(&path, "alpha\n\nbeta\n").unwrap();
        assert_eq!(WordList::load(&path).len(), 2);
    }
}

// Composite key scheme shared by the orchestrator and the cache.
//
// | Entity              | PK                     | SK                 |
// |---------------------|------------------------|--------------------|
// | Race ids for a day  | RACE#{date}#{track}    | IDS                |
// | Race card           | RACE#{race_id}         | METADATA           |
// | Horse history       | HORSE#{horse_id}       | RESULTS            |
// | Horse pedigree      | HORSE#{horse_id}       | PARENT             |
// | Jockey stats        | JOCKEY#{jockey_id}     | STATS              |
// | Analysis result     | ANALYSIS#{race_id}     | PROMPT#{hash}      |

use md5::{Digest, Md5};

pub const DEFAULT_PROMPT_HASH: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pk: String,
    pub sk: String,
}

impl CacheKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    pub fn race_ids(date: &str, track: &str) -> Self {
        Self::new(format!("RACE#{date}#{track}"), "IDS")
    }

    pub fn race_card(race_id: &str) -> Self {
        Self::new(format!("RACE#{race_id}"), "METADATA")
    }

    pub fn horse_history(horse_id: &str) -> Self {
        Self::new(format!("HORSE#{horse_id}"), "RESULTS")
    }

    pub fn horse_parents(horse_id: &str) -> Self {
        Self::new(format!("HORSE#{horse_id}"), "PARENT")
    }

    pub fn jockey_stats(jockey_id: &str) -> Self {
        Self::new(format!("JOCKEY#{jockey_id}"), "STATS")
    }

    pub fn analysis(race_id: &str, prompt: &str) -> Self {
        Self::new(format!("ANALYSIS#{race_id}"), format!("PROMPT#{}", prompt_hash(prompt)))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// `default` for an empty or blank prompt, otherwise the hex MD5 of the
/// prompt's UTF-8 bytes. Rows written by the analysis service use the same
/// digest, so it must not change.
pub fn prompt_hash(prompt: &str) -> String {
    if prompt.trim().is_empty() {
        return DEFAULT_PROMPT_HASH.to_string();
    }
    hex::encode(Md5::digest(prompt.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_scheme() {
        assert_eq!(CacheKey::race_ids("20231126", "東京"), CacheKey::new("RACE#20231126#東京", "IDS"));
        assert_eq!(CacheKey::race_card("202305050811").pk, "RACE#202305050811");
        assert_eq!(CacheKey::race_card("202305050811").sk, "METADATA");
        assert_eq!(CacheKey::horse_history("2019105219").sk, "RESULTS");
        assert_eq!(CacheKey::horse_parents("2019105219").sk, "PARENT");
        assert_eq!(CacheKey::jockey_stats("01126"), CacheKey::new("JOCKEY#01126", "STATS"));
    }

    #[test]
    fn history_and_parents_share_a_partition() {
        assert_eq!(CacheKey::horse_history("x").pk, CacheKey::horse_parents("x").pk);
    }

    #[test]
    fn blank_prompts_use_default() {
        assert_eq!(prompt_hash(""), "default");
        assert_eq!(prompt_hash("  \n\t"), "default");
        assert_eq!(CacheKey::analysis("202305050811", "").sk, "PROMPT#default");
    }

    #[test]
    fn prompt_hash_is_stable_hex() {
        let h = prompt_hash("穴馬を重視して");
        assert_eq!(h.len(), 32);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(h, prompt_hash("穴馬を重視して"));
        assert_ne!(h, prompt_hash("本命重視"));
        assert_eq!(
            prompt_hash("abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            CacheKey::analysis("202305050811", "abc").sk,
            "PROMPT#900150983cd24fb0d6963f7d28e17f72"
        );
    }
}

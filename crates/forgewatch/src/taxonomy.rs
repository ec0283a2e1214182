//! Topic taxonomy and the base queries generated from it.
//!
//! Base queries combine topics from named categories (device, wireless, nfc
//! and so on) with each other and with language and star qualifiers. After
//! discovery, topic pairs that keep showing up together on found
//! repositories become follow-up queries.

use std::collections::{BTreeMap, HashSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::RepoSummary;

/// Qualifier appended to every generated query.
const ACTIVE_ONLY: &str = "archived:false";

/// A named group of related topics. The first topics are the most
/// representative and are the ones combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub topics: Vec<String>,
}

impl Category {
    fn new(name: &str, topics: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    /// Ordered categories. The first is the device category whose leading
    /// topic is the main topic.
    pub categories: Vec<Category>,
    /// Category pairs combined three-by-three.
    pub logical_pairs: Vec<(String, String)>,
    /// Category triples: main topic of the first with two topics each of
    /// the others.
    pub triples: Vec<(String, String, String)>,
    pub languages: Vec<String>,
    pub star_filters: Vec<String>,
    /// Hand-written queries appended as-is.
    pub compound_queries: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        let categories = vec![
            Category::new(
                "device",
                &["flipperzero", "flipper-zero", "flipper", "flipper0", "flipper-device", "flipper-one"],
            ),
            Category::new(
                "wireless",
                &[
                    "subghz", "sub-ghz", "433mhz", "315mhz", "868mhz", "915mhz", "rf", "radio",
                    "wireless", "remote", "transmitter", "receiver", "ask", "fsk", "ook", "gfsk",
                    "rolling-code", "static-code",
                ],
            ),
            Category::new(
                "nfc",
                &[
                    "nfc", "nfc-a", "nfc-b", "nfc-v", "nfc-f", "mifare", "ntag", "ultralight",
                    "desfire", "felica", "iso14443", "iso15693", "nfc-card", "nfc-tag", "emv",
                ],
            ),
            Category::new(
                "rfid",
                &[
                    "rfid", "lf-rfid", "hf-rfid", "em4100", "em4102", "em4305", "hid", "indala",
                    "t5577", "fdx-b", "125khz", "13.56mhz",
                ],
            ),
            Category::new(
                "infrared",
                &[
                    "infrared", "ir", "ir-remote", "ir-blaster", "lirc", "tv-remote", "ac-remote",
                    "universal-remote", "pronto",
                ],
            ),
            Category::new(
                "ibutton",
                &["ibutton", "dallas-key", "one-wire", "1-wire", "ds1990", "ds1992", "ds1993", "maxim"],
            ),
            Category::new(
                "badusb",
                &[
                    "badusb", "bad-usb", "rubber-ducky", "ducky-script", "hid-attack", "usb-attack",
                    "payload", "keystroke", "digispark", "teensy", "bash-bunny",
                ],
            ),
            Category::new(
                "app",
                &[
                    "fap", "flipper-app", "flipper-application", "flipper-plugin", "flipper-tool",
                    "flipper-game", "flipper-utility", "fap-file", "application-fam",
                ],
            ),
            Category::new(
                "firmware",
                &[
                    "firmware", "custom-firmware", "unleashed", "roguemaster", "momentum", "xtreme",
                    "firmware-mod", "ota", "bootloader",
                ],
            ),
            Category::new(
                "hardware",
                &[
                    "gpio", "uart", "i2c", "spi", "usb", "bluetooth", "ble", "wifi", "esp32",
                    "cc1101", "nrf24", "lora",
                ],
            ),
            Category::new(
                "security",
                &[
                    "pentest", "pentesting", "redteam", "security", "hacking", "exploit",
                    "vulnerability", "infosec", "cybersecurity",
                ],
            ),
            Category::new(
                "dev",
                &["sdk", "api", "library", "framework", "toolchain", "debugging", "ufbt", "fbt", "vscode", "ide"],
            ),
        ];

        let pair = |a: &str, b: &str| (a.to_string(), b.to_string());
        let triple = |a: &str, b: &str, c: &str| (a.to_string(), b.to_string(), c.to_string());

        Self {
            categories,
            logical_pairs: vec![
                pair("wireless", "security"),
                pair("nfc", "security"),
                pair("badusb", "security"),
                pair("app", "wireless"),
                pair("app", "nfc"),
                pair("firmware", "wireless"),
                pair("firmware", "hardware"),
                pair("dev", "app"),
                pair("infrared", "hardware"),
            ],
            triples: vec![
                triple("device", "app", "wireless"),
                triple("device", "firmware", "wireless"),
                triple("device", "app", "nfc"),
                triple("device", "badusb", "security"),
                triple("device", "infrared", "hardware"),
                triple("app", "wireless", "security"),
                triple("firmware", "hardware", "dev"),
            ],
            languages: ["C", "Python", "Rust", "C++", "JavaScript"]
                .map(String::from)
                .to_vec(),
            star_filters: [">5", ">10", ">20", ">50", ">100", ">200"]
                .map(String::from)
                .to_vec(),
            compound_queries: [
                "topic:flipperzero AND (topic:subghz OR topic:nfc OR topic:rfid OR topic:infrared) AND archived:false",
                "(topic:flipper-app OR topic:fap) AND (topic:subghz OR topic:nfc OR topic:badusb) AND archived:false",
                "(topic:unleashed OR topic:roguemaster OR topic:momentum OR topic:xtreme) AND archived:false",
                "topic:flipperzero AND (topic:pentest OR topic:security OR topic:hacking) AND stars:>10 AND archived:false",
                "(topic:sdk OR topic:api OR topic:library) AND (topic:flipperzero OR topic:flipper) AND archived:false",
                "topic:flipper AND (topic:gpio OR topic:uart OR topic:i2c OR topic:esp32) AND archived:false",
                "(topic:flipperzero OR topic:subghz OR topic:nfc) AND stars:>20 AND forks:>5 AND archived:false",
                "topic:flipper AND (language:C OR language:Rust) AND stars:>50 AND archived:false",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl Taxonomy {
    fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    fn topics(&self, name: &str, n: usize) -> &[String] {
        self.category(name)
            .map(|c| &c.topics[..n.min(c.topics.len())])
            .unwrap_or_default()
    }

    /// The device category's leading topic.
    pub fn main_topic(&self) -> Option<&str> {
        self.categories
            .first()
            .and_then(|c| c.topics.first())
            .map(String::as_str)
    }

    /// All generated base queries, deduplicated, in generation order.
    pub fn queries(&self) -> Vec<String> {
        let mut out = QueryList::default();
        let Some(device) = self.categories.first() else {
            out.extend(self.compound_queries.iter().cloned());
            return out.into_vec();
        };

        // Leading device topics against every other category.
        for d in self.topics(&device.name, 3) {
            for category in self.categories.iter().skip(1) {
                for t in category.topics.iter().take(5) {
                    out.push(topics_query(&[d, t], None));
                }
            }
        }

        for (a, b) in &self.logical_pairs {
            for t1 in self.topics(a, 3) {
                for t2 in self.topics(b, 3) {
                    out.push(topics_query(&[t1, t2], None));
                }
            }
        }

        for (a, b, c) in &self.triples {
            let Some(t1) = self.topics(a, 1).first() else {
                continue;
            };
            for t2 in self.topics(b, 2) {
                for t3 in self.topics(c, 2) {
                    out.push(topics_query(&[t1, t2, t3], None));
                }
            }
        }

        for main in self.topics(&device.name, 2) {
            for lang in &self.languages {
                out.push(topics_query(&[main], Some(&format!("language:{}", lang))));
            }
            for stars in &self.star_filters {
                out.push(topics_query(&[main], Some(&format!("stars:{}", stars))));
            }
            for lang in self.languages.iter().take(3) {
                for stars in self.star_filters.iter().take(3) {
                    out.push(topics_query(
                        &[main],
                        Some(&format!("language:{} stars:{}", lang, stars)),
                    ));
                }
            }
        }

        out.extend(self.compound_queries.iter().cloned());
        out.into_vec()
    }

    /// Query for repositories created since yesterday under the main topic.
    pub fn recent_query(&self, today: NaiveDate) -> Option<String> {
        let main = self.main_topic()?;
        let since = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        Some(format!("topic:{} created:>={}", main, since))
    }
}

fn topics_query(topics: &[&String], qualifier: Option<&str>) -> String {
    let mut parts: Vec<String> = topics.iter().map(|t| format!("topic:{}", t)).collect();
    if let Some(q) = qualifier {
        parts.push(q.to_string());
    }
    parts.push(ACTIVE_ONLY.to_string());
    parts.join(" ")
}

/// Order-independent form of a query: its terms sorted and space-joined.
///
/// `topic:a topic:b` and `topic:b topic:a` search the same thing.
pub fn query_key(query: &str) -> String {
    let mut terms: Vec<&str> = query.split_whitespace().collect();
    terms.sort_unstable();
    terms.join(" ")
}

/// Insertion-ordered unique list of query strings.
#[derive(Debug, Default)]
struct QueryList {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl QueryList {
    fn push(&mut self, query: String) {
        if self.seen.insert(query.clone()) {
            self.items.push(query);
        }
    }

    fn extend(&mut self, queries: impl IntoIterator<Item = String>) {
        for q in queries {
            self.push(q);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

/// Topic co-occurrence counts over discovered repositories.
#[derive(Debug, Clone, Default)]
pub struct TopicStats {
    singles: BTreeMap<String, usize>,
    pairs: BTreeMap<(String, String), usize>,
}

impl TopicStats {
    pub fn from_repositories<'a, I>(repos: I) -> Self
    where
        I: IntoIterator<Item = &'a RepoSummary>,
    {
        let mut stats = Self::default();
        for repo in repos {
            stats.record(&repo.topics);
        }
        stats
    }

    fn record(&mut self, topics: &[String]) {
        let mut unique: Vec<&String> = topics.iter().collect();
        unique.sort();
        unique.dedup();
        for (i, a) in unique.iter().enumerate() {
            *self.singles.entry((*a).clone()).or_default() += 1;
            for b in &unique[i + 1..] {
                *self
                    .pairs
                    .entry(((*a).clone(), (*b).clone()))
                    .or_default() += 1;
            }
        }
    }

    pub fn distinct_topics(&self) -> usize {
        self.singles.len()
    }

    pub fn pair_count(&self, a: &str, b: &str) -> usize {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.pairs.get(&key).copied().unwrap_or_default()
    }

    /// Queries for pairs seen at least `min_count` times, most frequent
    /// first, skipping any already in `exclude`.
    pub fn follow_up_queries(
        &self,
        min_count: usize,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Vec<String> {
        let mut ranked: Vec<(&(String, String), &usize)> = self
            .pairs
            .iter()
            .filter(|(_, count)| **count >= min_count)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let excluded: HashSet<String> = exclude.iter().map(|q| query_key(q)).collect();
        ranked
            .into_iter()
            .map(|((a, b), _)| topics_query(&[a, b], None))
            .filter(|q| !excluded.contains(&query_key(q)))
            .take(limit)
            .collect()
    }
}

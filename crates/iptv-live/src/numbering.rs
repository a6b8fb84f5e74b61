//! Session-local display numbers from category buckets.
//!
//! Categories are classified by keyword into a bucket; each bucket owns a
//! hundred-wide range (news 100s .. documentary 500s, everything else 600 and
//! up).  A channel keeps its number only if it already lies in its own
//! bucket's range; the rest are numbered in list order from the bucket base,
//! skipping numbers in use.  The list is then stably sorted by number.

use std::collections::{HashMap, HashSet};

use iptv_proto::protocol::{Category, Channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    News,
    Sport,
    Movies,
    Kids,
    Documentary,
    Other,
}

const KEYWORDS: &[(Bucket, &[&str])] = &[
    (Bucket::News, &["news", "haber"]),
    (Bucket::Sport, &["sport", "spor"]),
    (Bucket::Movies, &["movie", "film", "sinema", "cinema"]),
    (Bucket::Kids, &["kids", "çocuk", "cocuk", "child", "cartoon"]),
    (Bucket::Documentary, &["documentar", "belgesel"]),
];

impl Bucket {
    pub fn classify(category_name: &str) -> Self {
        let name = category_name.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| name.contains(w)))
            .map(|(bucket, _)| *bucket)
            .unwrap_or(Bucket::Other)
    }

    pub fn base(self) -> u32 {
        match self {
            Bucket::News => 100,
            Bucket::Sport => 200,
            Bucket::Movies => 300,
            Bucket::Kids => 400,
            Bucket::Documentary => 500,
            Bucket::Other => 600,
        }
    }

    pub fn contains(self, number: u32) -> bool {
        match self {
            Bucket::Other => number >= self.base(),
            _ => (self.base()..self.base() + 100).contains(&number),
        }
    }
}

/// Renumber `channels` in place and sort them by number.  Deterministic for
/// a given list order and category set.
pub fn assign_session_numbers(channels: &mut [Channel], categories: &[Category]) {
    let names: HashMap<&str, &str> = categories
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();
    let buckets: Vec<Bucket> = channels
        .iter()
        .map(|ch| {
            let name = ch
                .category_id
                .as_deref()
                .and_then(|id| names.get(id).copied())
                .unwrap_or("");
            Bucket::classify(name)
        })
        .collect();

    // keep valid in-bucket numbers, first come first served
    let mut taken: HashSet<u32> = HashSet::new();
    let mut keep = vec![false; channels.len()];
    for (i, ch) in channels.iter().enumerate() {
        if let Some(n) = ch.number {
            if buckets[i].contains(n) && taken.insert(n) {
                keep[i] = true;
            }
        }
    }

    let mut cursors: HashMap<Bucket, u32> = HashMap::new();
    for (i, ch) in channels.iter_mut().enumerate() {
        if keep[i] {
            continue;
        }
        let bucket = buckets[i];
        let cursor = cursors.entry(bucket).or_insert(bucket.base() + 1);
        while taken.contains(&*cursor) {
            *cursor += 1;
        }
        ch.number = Some(*cursor);
        taken.insert(*cursor);
        *cursor += 1;
    }

    channels.sort_by_key(|ch| ch.number.unwrap_or(u32::MAX));
}

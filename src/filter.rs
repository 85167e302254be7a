use crate::keywords::KeywordSet;
use crate::types::TenderRecord;

/// Lowercased searchable fields. A keyword must sit inside one field;
/// it never matches across the title/text boundary.
struct Fields {
    title: String,
    raw_text: String,
}

impl Fields {
    fn of(record: &TenderRecord) -> Self {
        Self {
            title: record.title.to_lowercase(),
            raw_text: record.raw_text.to_lowercase(),
        }
    }

    fn contains(&self, term: &str) -> bool {
        self.title.contains(term) || self.raw_text.contains(term)
    }
}

/// Weighted count of distinct keywords found in the title or raw text.
///
/// Case-insensitive substring matching, no stemming. Pure.
pub fn score(record: &TenderRecord, keywords: &KeywordSet) -> u32 {
    let fields = Fields::of(record);

    keywords.iter()
        .filter(|k| fields.contains(&k.term))
        .map(|k| k.weight)
        .sum()
}

pub fn is_relevant(record: &TenderRecord, keywords: &KeywordSet) -> bool {
    score(record, keywords) > 0
}

/// Keywords that matched, in keyword-file order
pub fn matched_terms<'a>(record: &TenderRecord, keywords: &'a KeywordSet) -> Vec<&'a str> {
    let fields = Fields::of(record);

    keywords.iter()
        .filter(|k| fields.contains(&k.term))
        .map(|k| k.term.as_str())
        .collect()
}

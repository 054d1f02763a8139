//! The ordered collection of dictionaries and its lookup modes.

use std::collections::BTreeSet;
use std::path::Path;

use log::{error, info};

use super::compare::{is_pure_english, is_vowel, stardict_strcmp};
use super::dict::Dict;
use super::distance::edit_distance;
use super::error::Result;
use super::query::Pattern;
use super::record::Record;
use super::WordLookup;

/// Starting cap for fuzzy lookups; shrinks as better candidates fill the
/// result slots.
pub const MAX_FUZZY_DISTANCE: usize = 3;

/// How many pattern matches a single dictionary may contribute.
pub const MAX_MATCH_ITEM_PER_LIB: usize = 100;

/// Ordered set of loaded dictionaries.
///
/// Load order is the caller's to decide; every lookup walks the
/// dictionaries in that order. The optional progress callback fires at
/// per-dictionary checkpoints inside the fuzzy, pattern and data scans; it
/// reports progress only and cannot cancel anything.
pub struct Library {
    dicts: Vec<Dict>,
    fuzzy: bool,
    verbose: bool,
    progress: Option<Box<dyn Fn()>>,
}

impl Library {
    /// `fuzzy` enables the morphology fallback in [`simple_lookup`].
    ///
    /// [`simple_lookup`]: Library::simple_lookup
    pub fn new(fuzzy: bool) -> Self {
        Library {
            dicts: Vec::new(),
            fuzzy,
            verbose: false,
            progress: None,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_progress_callback(&mut self, callback: Box<dyn Fn()>) {
        self.progress = Some(callback);
    }

    /// Load dictionaries in the order given. A dictionary that fails to
    /// load is reported and skipped; the rest keep loading.
    pub fn load<I, P>(&mut self, ifo_paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in ifo_paths {
            self.load_dictionary(path.as_ref());
        }
    }

    /// Load one dictionary; returns whether it is now part of the library.
    pub fn load_dictionary(&mut self, ifo_path: &Path) -> bool {
        match Dict::load(ifo_path, self.verbose) {
            Ok(dict) => {
                self.dicts.push(dict);
                true
            }
            Err(err) => {
                error!("failed to load dictionary {}: {}", ifo_path.display(), err);
                false
            }
        }
    }

    pub fn ndicts(&self) -> usize {
        self.dicts.len()
    }

    pub fn dict_name(&self, lib: usize) -> &str {
        self.dicts[lib].bookname()
    }

    pub fn narticles(&self, lib: usize) -> usize {
        self.dicts[lib].word_count()
    }

    /// The `idx`-th headword of dictionary `lib`.
    pub fn word(&mut self, lib: usize, idx: usize) -> Result<String> {
        self.dicts[lib].key(idx)
    }

    /// The decoded record for the `idx`-th entry of dictionary `lib`.
    pub fn record(&mut self, lib: usize, idx: usize) -> Result<Record> {
        self.dicts[lib].record(idx)
    }

    /// Exact lookup in one dictionary, falling back to the English
    /// morphology cascade when fuzzy mode is on and nothing matched.
    pub fn simple_lookup(&mut self, word: &str, lib: usize) -> Result<WordLookup> {
        let mut res = self.dicts[lib].lookup(word)?;
        if !res.found && self.fuzzy {
            res.found = self.lookup_similar_word(word, lib, &mut res.indices)?;
        }
        Ok(res)
    }

    /// Morphology fallback: case variants first, then English suffix rules.
    /// Hits from every attempted candidate accumulate into `indices`.
    pub fn lookup_similar_word(
        &mut self,
        word: &str,
        lib: usize,
        indices: &mut BTreeSet<usize>,
    ) -> Result<bool> {
        let mut found = false;

        // Case variants, each tried only when it differs from the input.
        let lower = word.to_lowercase();
        if lower != word && self.lookup_into(lib, &lower, indices)? {
            found = true;
        }
        if !found {
            let upper = word.to_uppercase();
            if upper != word && self.lookup_into(lib, &upper, indices)? {
                found = true;
            }
        }
        if !found {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                let title: String = first
                    .to_uppercase()
                    .chain(chars.as_str().to_lowercase().chars())
                    .collect();
                if title != word && self.lookup_into(lib, &title, indices)? {
                    found = true;
                }
            }
        }

        if !is_pure_english(word) {
            return Ok(found);
        }
        let bytes = word.as_bytes();
        let len = bytes.len();
        // Suffix rules also retry a lowercased stem when the suffix was
        // uppercase or the word starts with an uppercase letter.
        let first_upper = bytes.first().is_some_and(|b| b.is_ascii_uppercase());

        // Cut a single trailing "s"/"S", or the "d" of "ed"/"ED".
        if !found {
            let upcase = (len > 1 && bytes[len - 1] == b'S')
                || (len > 2 && word.ends_with("ED"));
            if upcase
                || (len > 1 && bytes[len - 1] == b's')
                || (len > 2 && word.ends_with("ed"))
            {
                found = self.lookup_stem(lib, &word[..len - 1], upcase || first_upper, indices)?;
            }
        }

        // Cut "ly", undoubling a final consonant.
        if !found && len > 2 {
            let upcase = word.ends_with("LY");
            if upcase || word.ends_with("ly") {
                let stem = &word[..len - 2];
                if doubled_consonant(stem.as_bytes()) {
                    found = self.lookup_stem(
                        lib,
                        &stem[..stem.len() - 1],
                        upcase || first_upper,
                        indices,
                    )?;
                }
                if !found {
                    found = self.lookup_stem(lib, stem, upcase || first_upper, indices)?;
                }
            }
        }

        // Cut "ing", undoubling, then trying a restored final "e".
        if !found && len > 3 {
            let upcase = word.ends_with("ING");
            if upcase || word.ends_with("ing") {
                let stem = &word[..len - 3];
                if doubled_consonant(stem.as_bytes()) {
                    found = self.lookup_stem(
                        lib,
                        &stem[..stem.len() - 1],
                        upcase || first_upper,
                        indices,
                    )?;
                }
                if !found {
                    found = self.lookup_stem(lib, stem, upcase || first_upper, indices)?;
                }
                if !found {
                    let with_e = format!("{}{}", stem, if upcase { 'E' } else { 'e' });
                    found = self.lookup_stem(lib, &with_e, upcase || first_upper, indices)?;
                }
            }
        }

        // Cut "es" after s, x, o, ch or sh.
        if !found && len > 3 {
            let upcase = word.ends_with("ES")
                && (matches!(bytes[len - 3], b'S' | b'X' | b'O')
                    || (len > 4
                        && bytes[len - 3] == b'H'
                        && matches!(bytes[len - 4], b'C' | b'S')));
            let lowcase = word.ends_with("es")
                && (matches!(bytes[len - 3], b's' | b'x' | b'o')
                    || (len > 4
                        && bytes[len - 3] == b'h'
                        && matches!(bytes[len - 4], b'c' | b's')));
            if upcase || lowcase {
                found = self.lookup_stem(lib, &word[..len - 2], upcase || first_upper, indices)?;
            }
        }

        // Cut "ed", undoubling.
        if !found && len > 3 {
            let upcase = word.ends_with("ED");
            if upcase || word.ends_with("ed") {
                let stem = &word[..len - 2];
                if doubled_consonant(stem.as_bytes()) {
                    found = self.lookup_stem(
                        lib,
                        &stem[..stem.len() - 1],
                        upcase || first_upper,
                        indices,
                    )?;
                }
                if !found {
                    found = self.lookup_stem(lib, stem, upcase || first_upper, indices)?;
                }
            }
        }

        // "ied" -> "y".
        if !found && len > 3 {
            let upcase = word.ends_with("IED");
            if upcase || word.ends_with("ied") {
                let stem = format!("{}{}", &word[..len - 3], if upcase { 'Y' } else { 'y' });
                found = self.lookup_stem(lib, &stem, upcase || first_upper, indices)?;
            }
        }

        // "ies" -> "y".
        if !found && len > 3 {
            let upcase = word.ends_with("IES");
            if upcase || word.ends_with("ies") {
                let stem = format!("{}{}", &word[..len - 3], if upcase { 'Y' } else { 'y' });
                found = self.lookup_stem(lib, &stem, upcase || first_upper, indices)?;
            }
        }

        // Cut "er".
        if !found && len > 2 {
            let upcase = word.ends_with("ER");
            if upcase || word.ends_with("er") {
                found = self.lookup_stem(lib, &word[..len - 2], upcase || first_upper, indices)?;
            }
        }

        // Cut "est".
        if !found && len > 3 {
            let upcase = word.ends_with("EST");
            if upcase || word.ends_with("est") {
                found = self.lookup_stem(lib, &word[..len - 3], upcase || first_upper, indices)?;
            }
        }

        Ok(found)
    }

    fn lookup_into(
        &mut self,
        lib: usize,
        word: &str,
        indices: &mut BTreeSet<usize>,
    ) -> Result<bool> {
        let res = self.dicts[lib].lookup(word)?;
        indices.extend(res.indices);
        Ok(res.found)
    }

    /// Try a stem, then — when case demands it — its lowercase form.
    fn lookup_stem(
        &mut self,
        lib: usize,
        stem: &str,
        caseful: bool,
        indices: &mut BTreeSet<usize>,
    ) -> Result<bool> {
        if self.lookup_into(lib, stem, indices)? {
            return Ok(true);
        }
        if caseful {
            let lower = stem.to_ascii_lowercase();
            if lower != stem && self.lookup_into(lib, &lower, indices)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fuzzy lookup across every dictionary: up to `max_results` headwords
    /// within edit distance of the query, best first.
    ///
    /// The result slots run a tournament: a new candidate evicts the slot
    /// holding the current worst distance, and the acceptance cap tightens
    /// to the worst distance still held. Ties sort by the format
    /// comparator.
    pub fn fuzzy_lookup(&mut self, word: &str, max_results: usize) -> Result<Vec<String>> {
        if word.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let query: Vec<char> = word.chars().map(fold_lower).collect();
        let query_len = query.len();

        struct Slot {
            word: Option<String>,
            distance: usize,
        }
        let mut slots: Vec<Slot> = (0..max_results)
            .map(|_| Slot {
                word: None,
                distance: MAX_FUZZY_DISTANCE,
            })
            .collect();
        let mut max_distance = MAX_FUZZY_DISTANCE;

        for lib in 0..self.dicts.len() {
            if let Some(progress) = &self.progress {
                progress();
            }
            let nwords = self.dicts[lib].word_count();
            for idx in 0..nwords {
                let candidate = self.dicts[lib].key(idx)?;
                let candidate_len = candidate.chars().count();
                if candidate_len.abs_diff(query_len) >= max_distance {
                    continue;
                }
                let folded: Vec<char> = candidate
                    .chars()
                    .take(query_len)
                    .map(fold_lower)
                    .collect();

                let distance = edit_distance(&folded, &query, max_distance);
                if distance >= max_distance || distance >= query_len {
                    continue;
                }

                let mut already_in_list = false;
                let mut worst_at = 0usize;
                for (j, slot) in slots.iter().enumerate() {
                    if slot.word.as_deref() == Some(candidate.as_str()) {
                        already_in_list = true;
                        break;
                    }
                    if slot.distance == max_distance {
                        worst_at = j;
                    }
                }
                if already_in_list {
                    continue;
                }
                slots[worst_at] = Slot {
                    word: Some(candidate),
                    distance,
                };
                max_distance = slots.iter().map(|s| s.distance).max().unwrap_or(distance);
            }
        }

        slots.sort_by(|a, b| {
            a.distance.cmp(&b.distance).then_with(|| match (&a.word, &b.word) {
                (Some(x), Some(y)) => stardict_strcmp(x, y),
                _ => std::cmp::Ordering::Equal,
            })
        });
        Ok(slots.into_iter().filter_map(|s| s.word).collect())
    }

    /// Glob lookup across every dictionary; results are deduplicated and
    /// sorted by the format comparator. Each dictionary contributes at most
    /// [`MAX_MATCH_ITEM_PER_LIB`] matches.
    pub fn pattern_lookup(&mut self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern);
        let mut matched: Vec<String> = Vec::new();

        for lib in 0..self.dicts.len() {
            let indices = self.dicts[lib].lookup_pattern(&pattern, MAX_MATCH_ITEM_PER_LIB)?;
            if indices.is_empty() {
                continue;
            }
            if let Some(progress) = &self.progress {
                progress();
            }
            for idx in indices {
                let word = self.dicts[lib].key(idx)?;
                if !matched.iter().any(|m| *m == word) {
                    matched.push(word);
                }
            }
        }

        matched.sort_by(|a, b| stardict_strcmp(a, b));
        Ok(matched)
    }

    /// Full-text search: every record whose text fields contain all of the
    /// query's needles, reported as one headword list per dictionary.
    ///
    /// The query is split on spaces; `\ `, `\\`, `\t` and `\n` escape to
    /// their literal characters, any other `\X` to `X`. Dictionaries whose
    /// schema has no text field are skipped.
    pub fn data_lookup(&mut self, query: &str) -> Result<Vec<Vec<String>>> {
        let mut results: Vec<Vec<String>> = vec![Vec::new(); self.dicts.len()];
        let needles = parse_needles(query);
        if needles.is_empty() {
            return Ok(results);
        }

        let mut scratch = Vec::new();
        for lib in 0..self.dicts.len() {
            if !self.dicts[lib].supports_data_search() {
                continue;
            }
            if let Some(progress) = &self.progress {
                progress();
            }
            let nwords = self.dicts[lib].word_count();
            for idx in 0..nwords {
                if self.dicts[lib].matches_data(&needles, idx, &mut scratch)? {
                    results[lib].push(self.dicts[lib].key(idx)?);
                }
            }
        }

        let hits: usize = results.iter().map(|r| r.len()).sum();
        info!("data lookup matched {} records", hits);
        Ok(results)
    }
}

/// Stem ends in a doubled non-vowel preceded by a vowel ("stopp", "runn").
fn doubled_consonant(stem: &[u8]) -> bool {
    let n = stem.len();
    n > 3
        && stem[n - 1] == stem[n - 2]
        && !is_vowel(stem[n - 2])
        && is_vowel(stem[n - 3])
}

/// One-to-one lowercase fold for fuzzy comparisons.
fn fold_lower(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

/// Split a data query into needles: whitespace-separated, with `\`-escapes
/// (`\ `, `\\`, `\t`, `\n`, and `\X` for anything else).
fn parse_needles(query: &str) -> Vec<String> {
    let mut needles = Vec::new();
    let mut current = String::new();
    let mut chars = query.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('t') => current.push('\t'),
                Some('n') => current.push('\n'),
                Some(other) => current.push(other),
                None => break,
            },
            ' ' => {
                if !current.is_empty() {
                    needles.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        needles.push(current);
    }
    needles
}

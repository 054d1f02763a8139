//! Engine-level tests over constructed on-disk dictionaries: exact lookup,
//! duplicate walking, insertion points, index paging and the `.oft` cache,
//! synonyms, morphology, fuzzy, pattern and full-text search.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use flate2::write::GzEncoder;
use flate2::{Compress, Compression, Crc, FlushCompress};
use tempfile::TempDir;

use stardict_reader::{analyze_query, Dict, Library, QueryType};

// --- Fixture builder ---

struct DictBuilder {
    stem: String,
    bookname: String,
    schema: String,
    entries: Vec<(String, Vec<u8>)>,
    synonyms: Vec<(String, u32)>,
    gzip_index: bool,
    dictzip_payload: bool,
}

impl DictBuilder {
    /// Entries and synonyms must be given in comparator order, the way real
    /// index files are written.
    fn new(stem: &str, bookname: &str) -> Self {
        DictBuilder {
            stem: stem.to_string(),
            bookname: bookname.to_string(),
            schema: "m".to_string(),
            entries: Vec::new(),
            synonyms: Vec::new(),
            gzip_index: false,
            dictzip_payload: false,
        }
    }

    fn entry(mut self, key: &str, body: &[u8]) -> Self {
        self.entries.push((key.to_string(), body.to_vec()));
        self
    }

    fn synonym(mut self, key: &str, target: u32) -> Self {
        self.synonyms.push((key.to_string(), target));
        self
    }

    fn gzip_index(mut self) -> Self {
        self.gzip_index = true;
        self
    }

    fn dictzip_payload(mut self) -> Self {
        self.dictzip_payload = true;
        self
    }

    fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    fn write(self, dir: &Path) -> PathBuf {
        let mut payload = Vec::new();
        let mut idx = Vec::new();
        for (key, body) in &self.entries {
            let offset = payload.len() as u32;
            payload.extend_from_slice(body);
            idx.extend_from_slice(key.as_bytes());
            idx.push(0);
            idx.extend_from_slice(&offset.to_be_bytes());
            idx.extend_from_slice(&(body.len() as u32).to_be_bytes());
        }

        if self.gzip_index {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            std::io::Write::write_all(&mut enc, &idx).unwrap();
            fs::write(
                dir.join(format!("{}.idx.gz", self.stem)),
                enc.finish().unwrap(),
            )
            .unwrap();
        } else {
            fs::write(dir.join(format!("{}.idx", self.stem)), &idx).unwrap();
        }

        if self.dictzip_payload {
            write_dictzip(
                &dir.join(format!("{}.dict.dz", self.stem)),
                &payload,
                16,
            );
        } else {
            fs::write(dir.join(format!("{}.dict", self.stem)), &payload).unwrap();
        }

        if !self.synonyms.is_empty() {
            let mut syn = Vec::new();
            for (key, target) in &self.synonyms {
                syn.extend_from_slice(key.as_bytes());
                syn.push(0);
                syn.extend_from_slice(&target.to_be_bytes());
            }
            fs::write(dir.join(format!("{}.syn", self.stem)), syn).unwrap();
        }

        let mut ifo = String::new();
        ifo.push_str("StarDict's dict ifo file\n");
        ifo.push_str("version=2.4.2\n");
        ifo.push_str(&format!("bookname={}\n", self.bookname));
        ifo.push_str(&format!("wordcount={}\n", self.entries.len()));
        ifo.push_str(&format!("idxfilesize={}\n", idx.len()));
        if !self.schema.is_empty() {
            ifo.push_str(&format!("sametypesequence={}\n", self.schema));
        }
        if !self.synonyms.is_empty() {
            ifo.push_str(&format!("synwordcount={}\n", self.synonyms.len()));
        }
        let ifo_path = dir.join(format!("{}.ifo", self.stem));
        fs::write(&ifo_path, ifo).unwrap();
        ifo_path
    }
}

fn write_dictzip(path: &Path, payload: &[u8], chunk_len: usize) {
    let mut chunk_sizes: Vec<u16> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    for chunk in payload.chunks(chunk_len.max(1)) {
        let mut comp = Compress::new(Compression::default(), false);
        let mut out = vec![0u8; chunk.len() * 2 + 128];
        loop {
            let consumed = comp.total_in() as usize;
            let produced = comp.total_out() as usize;
            comp.compress(&chunk[consumed..], &mut out[produced..], FlushCompress::Sync)
                .unwrap();
            if comp.total_in() as usize == chunk.len() {
                break;
            }
        }
        out.truncate(comp.total_out() as usize);
        chunk_sizes.push(u16::try_from(out.len()).unwrap());
        body.extend_from_slice(&out);
    }

    let mut file = Vec::new();
    file.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x04]);
    file.extend_from_slice(&[0, 0, 0, 0, 0, 0x03]);
    let sub_len = 6 + 2 * chunk_sizes.len();
    file.extend_from_slice(&((4 + sub_len) as u16).to_le_bytes());
    file.extend_from_slice(b"RA");
    file.extend_from_slice(&(sub_len as u16).to_le_bytes());
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&(chunk_len as u16).to_le_bytes());
    file.extend_from_slice(&(chunk_sizes.len() as u16).to_le_bytes());
    for size in &chunk_sizes {
        file.extend_from_slice(&size.to_le_bytes());
    }
    file.extend_from_slice(&body);
    let mut crc = Crc::new();
    crc.update(payload);
    file.extend_from_slice(&crc.sum().to_le_bytes());
    file.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    fs::write(path, file).unwrap();
}

fn fruits(dir: &Path, stem: &str) -> PathBuf {
    DictBuilder::new(stem, "Fruits")
        .entry("apple", b"a pome")
        .entry("banana", b"x")
        .entry("cherry", b"a drupe")
        .write(dir)
}

fn indices(values: &[usize]) -> BTreeSet<usize> {
    values.iter().copied().collect()
}

// --- Exact lookup ---

#[test]
fn exact_lookup_finds_the_headword_and_its_record() {
    let dir = TempDir::new().unwrap();
    let ifo = fruits(dir.path(), "fruits");

    let mut lib = Library::new(true);
    assert!(lib.load_dictionary(&ifo));
    assert_eq!(lib.ndicts(), 1);
    assert_eq!(lib.dict_name(0), "Fruits");
    assert_eq!(lib.narticles(0), 3);

    let hit = lib.simple_lookup("banana", 0).unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[1]));
    let record = lib.record(0, 1).unwrap();
    assert_eq!(record.text_fields().collect::<String>(), "x");
}

#[test]
fn lookup_matches_case_insensitively() {
    let dir = TempDir::new().unwrap();
    let ifo = fruits(dir.path(), "ci");

    let mut lib = Library::new(true);
    lib.load([&ifo]);
    let hit = lib.simple_lookup("BaNaNa", 0).unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[1]));
}

#[test]
fn lookup_reports_every_case_variant() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("variants", "Variants")
        .entry("APPLE", b"shouting")
        .entry("Apple", b"title")
        .entry("apple", b"plain")
        .entry("banana", b"x")
        .write(dir.path());

    let mut dict = Dict::load(&ifo, false).unwrap();
    let hit = dict.lookup("apple").unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[0, 1, 2]));
}

#[test]
fn lookup_walks_all_duplicate_headwords() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("dups", "Dups")
        .entry("aaa", b"0")
        .entry("dup", b"1")
        .entry("dup", b"2")
        .entry("dup", b"3")
        .entry("zzz", b"4")
        .write(dir.path());

    let mut dict = Dict::load(&ifo, false).unwrap();
    let hit = dict.lookup("dup").unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[1, 2, 3]));
}

#[test]
fn misses_report_the_insertion_point() {
    let dir = TempDir::new().unwrap();
    let ifo = fruits(dir.path(), "misses");
    let mut dict = Dict::load(&ifo, false).unwrap();

    let miss = dict.lookup("blueberry").unwrap();
    assert!(!miss.found);
    assert!(miss.indices.is_empty());
    assert_eq!(miss.next_idx, Some(2));

    // Before the first key.
    assert_eq!(dict.lookup("aardvark").unwrap().next_idx, Some(0));
    // Past the last key.
    assert_eq!(dict.lookup("zebra").unwrap().next_idx, None);
}

// --- Offset index paging and the .oft cache ---

fn paged_dict(dir: &Path, stem: &str) -> PathBuf {
    let mut builder = DictBuilder::new(stem, "Paged");
    for i in 0..80 {
        let key = format!("word{:03}", i);
        let body = format!("def{:03}", i);
        builder = builder.entry(&key, body.as_bytes());
    }
    builder.write(dir)
}

#[test]
fn offset_index_pages_through_a_large_index() {
    let dir = TempDir::new().unwrap();
    let ifo = paged_dict(dir.path(), "paged");
    let mut dict = Dict::load(&ifo, false).unwrap();

    // Hits on page boundaries, mid-page and the final short page.
    for i in [0usize, 1, 31, 32, 33, 63, 64, 79] {
        let word = format!("word{:03}", i);
        let hit = dict.lookup(&word).unwrap();
        assert!(hit.found, "expected a hit for {}", word);
        assert_eq!(hit.indices, indices(&[i]), "wrong indices for {}", word);
    }

    // Records resolve through the paged entries.
    let record = dict.record(79).unwrap();
    assert_eq!(record.text_fields().collect::<String>(), "def079");

    // Insertion points work across pages.
    let miss = dict.lookup("word010a").unwrap();
    assert!(!miss.found);
    assert_eq!(miss.next_idx, Some(11));
    assert_eq!(dict.lookup("a").unwrap().next_idx, Some(0));
    assert_eq!(dict.lookup("zzz").unwrap().next_idx, None);
}

#[test]
fn oft_cache_round_trips_byte_identically() {
    let dir = TempDir::new().unwrap();
    let ifo = paged_dict(dir.path(), "oftcache");
    let oft = dir.path().join("oftcache.idx.oft");

    let dict = Dict::load(&ifo, false).unwrap();
    drop(dict);
    assert!(oft.exists(), "first load should write the cache");
    let cached = fs::read(&oft).unwrap();

    // Force a rebuild; the freshly computed table must be identical.
    fs::remove_file(&oft).unwrap();
    let mut dict = Dict::load(&ifo, false).unwrap();
    let rebuilt = fs::read(&oft).unwrap();
    assert_eq!(cached, rebuilt);

    // A load that used the cache still answers correctly.
    let hit = dict.lookup("word042").unwrap();
    assert_eq!(hit.indices, indices(&[42]));
}

#[test]
fn gzip_index_behaves_like_the_paged_one() {
    let dir = TempDir::new().unwrap();
    let mut builder = DictBuilder::new("gzidx", "Gz").gzip_index();
    for i in 0..40 {
        let key = format!("key{:02}", i);
        let body = format!("val{:02}", i);
        builder = builder.entry(&key, body.as_bytes());
    }
    let ifo = builder.write(dir.path());

    let mut dict = Dict::load(&ifo, false).unwrap();
    let hit = dict.lookup("key17").unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[17]));
    assert_eq!(
        dict.record(17).unwrap().text_fields().collect::<String>(),
        "val17"
    );
    assert_eq!(dict.lookup("key17a").unwrap().next_idx, Some(18));
}

// --- Synonyms ---

#[test]
fn synonyms_resolve_to_main_index_positions() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("syn", "Syn")
        .entry("color", b"hue")
        .entry("sound", b"noise")
        .synonym("colour", 0)
        .synonym("sound", 0)
        .write(dir.path());

    let mut dict = Dict::load(&ifo, false).unwrap();
    let hit = dict.lookup("colour").unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[0]));

    // A synonym spelled like a real headword unions both sources.
    let hit = dict.lookup("sound").unwrap();
    assert!(hit.found);
    assert_eq!(hit.indices, indices(&[0, 1]));
}

// --- Morphology ---

#[test]
fn morphology_cascade_strips_english_suffixes() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("stems", "Stems")
        .entry("box", b"container")
        .entry("dry", b"not wet")
        .entry("fly", b"insect")
        .entry("stop", b"halt")
        .entry("walk", b"go on foot")
        .write(dir.path());

    let mut lib = Library::new(true);
    lib.load([&ifo]);

    let expect = |lib: &mut Library, word: &str, idx: usize| {
        let hit = lib.simple_lookup(word, 0).unwrap();
        assert!(hit.found, "no morphology hit for {}", word);
        assert_eq!(hit.indices, indices(&[idx]), "wrong stem for {}", word);
    };

    expect(&mut lib, "walked", 4);
    expect(&mut lib, "walking", 4);
    expect(&mut lib, "WALKS", 4);
    expect(&mut lib, "stopped", 3);
    expect(&mut lib, "dried", 1);
    expect(&mut lib, "flies", 2);
    expect(&mut lib, "boxes", 0);
    expect(&mut lib, "walks", 4);

    let miss = lib.simple_lookup("jumped", 0).unwrap();
    assert!(!miss.found);
    assert!(miss.indices.is_empty());

    // Two-letter words must not trip the "ed" suffix check.
    let tiny = lib.simple_lookup("ed", 0).unwrap();
    assert!(!tiny.found);
}

// --- Fuzzy lookup ---

#[test]
fn fuzzy_lookup_ranks_by_distance_then_comparator() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("fuzzy", "Fuzzy")
        .entry("rest", b"1")
        .entry("test", b"2")
        .entry("testing", b"3")
        .entry("tests", b"4")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&ifo]);

    // "testing" is skipped outright: its length differs by the full cap.
    // "tests" is truncated to the query length before comparison.
    let results = lib.fuzzy_lookup("tost", 5).unwrap();
    assert_eq!(results, vec!["test", "tests", "rest"]);

    let query_len = "tost".chars().count();
    for word in &results {
        let folded: Vec<char> = word
            .to_lowercase()
            .chars()
            .take(query_len)
            .collect();
        let query: Vec<char> = "tost".chars().collect();
        let d = stardict_reader::stardict::distance::edit_distance(&folded, &query, 3);
        assert!(d <= 2, "{} too far: {}", word, d);
        assert!(d < query_len);
    }

    // The tournament keeps only the best n.
    let top2 = lib.fuzzy_lookup("tost", 2).unwrap();
    assert_eq!(top2, vec!["test", "tests"]);
}

#[test]
fn fuzzy_lookup_deduplicates_across_dictionaries() {
    let dir = TempDir::new().unwrap();
    let first = DictBuilder::new("fz1", "One")
        .entry("shared", b"1")
        .write(dir.path());
    let second = DictBuilder::new("fz2", "Two")
        .entry("shared", b"2")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&first, &second]);
    let results = lib.fuzzy_lookup("sharek", 8).unwrap();
    assert_eq!(results, vec!["shared"]);
}

// --- Pattern lookup ---

#[test]
fn pattern_lookup_unions_sorts_and_deduplicates() {
    let dir = TempDir::new().unwrap();
    let first = DictBuilder::new("pat1", "One")
        .entry("rest", b"1")
        .entry("test", b"2")
        .entry("testing", b"3")
        .write(dir.path());
    let second = DictBuilder::new("pat2", "Two")
        .entry("jest", b"4")
        .entry("test", b"5")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&first, &second]);

    let (kind, payload) = analyze_query("*est");
    assert_eq!(kind, QueryType::Regexp);
    let results = lib.pattern_lookup(&payload).unwrap();
    assert_eq!(results, vec!["jest", "rest", "test", "testing"]);
}

// --- Full-text data search ---

#[test]
fn data_lookup_finds_needles_in_every_dictionary() {
    let dir = TempDir::new().unwrap();
    let first = DictBuilder::new("data1", "One")
        .entry("greeting", b"hello world")
        .entry("other", b"goodbye")
        .write(dir.path());
    let second = DictBuilder::new("data2", "Two")
        .dictzip_payload()
        .entry("quiet", b"nothing here")
        .entry("salutation", b"workers of the world say hello loudly")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&first, &second]);

    let (kind, payload) = analyze_query("|hello world");
    assert_eq!(kind, QueryType::Data);
    let results = lib.data_lookup(&payload).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], vec!["greeting"]);
    assert_eq!(results[1], vec!["salutation"]);
}

#[test]
fn data_lookup_escapes_bind_needles_together() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("esc", "Esc")
        .entry("exact", b"hello world here")
        .entry("scattered", b"world of hello")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&ifo]);

    // Two needles: both entries contain both words somewhere.
    let both = lib.data_lookup("hello world").unwrap();
    assert_eq!(both[0], vec!["exact", "scattered"]);

    // One escaped needle: only the literal phrase matches.
    let phrase = lib.data_lookup(r"hello\ world").unwrap();
    assert_eq!(phrase[0], vec!["exact"]);
}

#[test]
fn data_lookup_skips_binary_only_dictionaries() {
    let dir = TempDir::new().unwrap();
    let ifo = DictBuilder::new("bin", "Bin")
        .schema("W")
        .entry("blob", b"hello world")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&ifo]);
    let results = lib.data_lookup("hello").unwrap();
    assert!(results[0].is_empty());
}

// --- Load failures and the progress callback ---

#[test]
fn corrupt_payload_fails_the_dictionary_but_not_the_library() {
    let dir = TempDir::new().unwrap();
    let bad = fruits(dir.path(), "bad");
    let good = fruits(dir.path(), "good");

    // Truncate the payload so the last record no longer ends at EOF.
    let dict_path = dir.path().join("bad.dict");
    let mut payload = fs::read(&dict_path).unwrap();
    payload.pop();
    fs::write(&dict_path, payload).unwrap();

    let mut lib = Library::new(false);
    lib.load([&bad, &good]);
    assert_eq!(lib.ndicts(), 1);
    assert_eq!(lib.dict_name(0), "Fruits");
    assert!(lib.simple_lookup("banana", 0).unwrap().found);
}

#[test]
fn missing_files_fail_the_load() {
    let dir = TempDir::new().unwrap();
    let ifo = dir.path().join("ghost.ifo");
    fs::write(
        &ifo,
        "StarDict's dict ifo file\nbookname=Ghost\nwordcount=1\nidxfilesize=10\n",
    )
    .unwrap();

    assert!(Dict::load(&ifo, false).is_err());
    let mut lib = Library::new(false);
    assert!(!lib.load_dictionary(&ifo));
    assert_eq!(lib.ndicts(), 0);
}

#[test]
fn progress_callback_fires_per_dictionary() {
    let dir = TempDir::new().unwrap();
    let first = DictBuilder::new("pg1", "One")
        .entry("alpha", b"1")
        .write(dir.path());
    let second = DictBuilder::new("pg2", "Two")
        .entry("beta", b"2")
        .write(dir.path());

    let mut lib = Library::new(false);
    lib.load([&first, &second]);

    let calls = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&calls);
    lib.set_progress_callback(Box::new(move || seen.set(seen.get() + 1)));

    lib.fuzzy_lookup("alphx", 4).unwrap();
    assert_eq!(calls.get(), 2);
}

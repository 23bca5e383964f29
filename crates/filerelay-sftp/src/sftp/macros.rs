// ── Macro & file-mask renaming engine ────────────────────────────────────────
//
// Expands `%Token%` macros (case-insensitive) and `*`/`?` masks into concrete
// file and directory names, and translates source masks into matchers.

use crate::sftp::error::{TransferError, TransferResult};
use chrono::{DateTime, Datelike, FixedOffset, Local};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Ticks between 0001-01-01 and 1970-01-01 (100 ns units).
const EPOCH_TICKS: i64 = 621_355_968_000_000_000;

// ── Context ──────────────────────────────────────────────────────────────────

/// Values the context macros read. Fixed for one expansion run so every
/// date token in a template sees the same instant.
#[derive(Debug, Clone)]
pub struct MacroContext {
    pub now: DateTime<FixedOffset>,
    pub transfer_name: String,
    pub transfer_id: String,
}

impl MacroContext {
    pub fn new(transfer_name: &str, transfer_id: &str) -> Self {
        Self::at(Local::now().fixed_offset(), transfer_name, transfer_id)
    }

    pub fn at(now: DateTime<FixedOffset>, transfer_name: &str, transfer_id: &str) -> Self {
        Self {
            now,
            transfer_name: transfer_name.to_string(),
            transfer_id: transfer_id.to_string(),
        }
    }
}

// ── Macro tables ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMacro {
    Ticks,
    DateTimeMs,
    DateTime,
    Date,
    Time,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Guid,
    TransferName,
    TransferId,
    WeekDay,
}

impl ContextMacro {
    pub const ALL: [ContextMacro; 15] = [
        ContextMacro::Ticks,
        ContextMacro::DateTimeMs,
        ContextMacro::DateTime,
        ContextMacro::Date,
        ContextMacro::Time,
        ContextMacro::Year,
        ContextMacro::Month,
        ContextMacro::Day,
        ContextMacro::Hour,
        ContextMacro::Minute,
        ContextMacro::Second,
        ContextMacro::Guid,
        ContextMacro::TransferName,
        ContextMacro::TransferId,
        ContextMacro::WeekDay,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            ContextMacro::Ticks => "%Ticks%",
            ContextMacro::DateTimeMs => "%DateTimeMs%",
            ContextMacro::DateTime => "%DateTime%",
            ContextMacro::Date => "%Date%",
            ContextMacro::Time => "%Time%",
            ContextMacro::Year => "%Year%",
            ContextMacro::Month => "%Month%",
            ContextMacro::Day => "%Day%",
            ContextMacro::Hour => "%Hour%",
            ContextMacro::Minute => "%Minute%",
            ContextMacro::Second => "%Second%",
            ContextMacro::Guid => "%Guid%",
            ContextMacro::TransferName => "%TransferName%",
            ContextMacro::TransferId => "%TransferId%",
            ContextMacro::WeekDay => "%WeekDay%",
        }
    }

    pub fn expand(&self, ctx: &MacroContext) -> String {
        let now = &ctx.now;
        match self {
            ContextMacro::Ticks => {
                let local_micros =
                    now.timestamp_micros() + i64::from(now.offset().local_minus_utc()) * 1_000_000;
                (local_micros * 10 + EPOCH_TICKS).to_string()
            }
            ContextMacro::DateTimeMs => now.format("%Y-%m-%d-%H-%M-%S-%3f").to_string(),
            ContextMacro::DateTime => now.format("%Y-%m-%d-%H-%M-%S").to_string(),
            ContextMacro::Date => now.format("%Y-%m-%d").to_string(),
            ContextMacro::Time => now.format("%H-%M-%S").to_string(),
            ContextMacro::Year => now.format("%Y").to_string(),
            ContextMacro::Month => now.format("%m").to_string(),
            ContextMacro::Day => now.format("%d").to_string(),
            ContextMacro::Hour => now.format("%H").to_string(),
            ContextMacro::Minute => now.format("%M").to_string(),
            ContextMacro::Second => now.format("%S").to_string(),
            ContextMacro::Guid => uuid::Uuid::new_v4().to_string(),
            ContextMacro::TransferName => ctx.transfer_name.clone(),
            ContextMacro::TransferId => ctx.transfer_id.to_uppercase(),
            ContextMacro::WeekDay => now.weekday().number_from_monday().to_string(),
        }
    }
}

/// Macros derived from the original file name; undefined for directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginMacro {
    SourceFileName,
    SourceFileExtension,
}

impl OriginMacro {
    pub const ALL: [OriginMacro; 2] = [
        OriginMacro::SourceFileName,
        OriginMacro::SourceFileExtension,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            OriginMacro::SourceFileName => "%SourceFileName%",
            OriginMacro::SourceFileExtension => "%SourceFileExtension%",
        }
    }

    pub fn expand(&self, original_name: &str) -> String {
        let (stem, ext) = split_extension(original_name);
        match self {
            OriginMacro::SourceFileName => stem.to_string(),
            OriginMacro::SourceFileExtension => ext.to_string(),
        }
    }
}

fn token_regex(token: &str) -> Regex {
    // Tokens are fixed ASCII literals; escaping makes the pattern infallible.
    Regex::new(&format!("(?i){}", regex::escape(token))).unwrap_or_else(|_| unreachable!())
}

lazy_static! {
    static ref CONTEXT_PATTERNS: Vec<(ContextMacro, Regex)> = ContextMacro::ALL
        .iter()
        .map(|m| (*m, token_regex(m.token())))
        .collect();
    static ref ORIGIN_PATTERNS: Vec<(OriginMacro, Regex)> = OriginMacro::ALL
        .iter()
        .map(|m| (*m, token_regex(m.token())))
        .collect();
}

// ── Name helpers ─────────────────────────────────────────────────────────────

/// Split `report.final.csv` into (`report.final`, `.csv`). Dot-files keep
/// their full name as stem.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

pub fn is_file_mask(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

fn ends_with_separator(s: &str) -> bool {
    s.ends_with('/') || s.ends_with('\\')
}

fn reject_reserved(value: &str, what: &str) -> TransferResult<()> {
    if value.contains('?') {
        return Err(TransferError::invalid_input(format!(
            "{} '{}' contains the reserved character '?'",
            what, value
        )));
    }
    Ok(())
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MacroEngine {
    ctx: MacroContext,
}

impl MacroEngine {
    pub fn new(ctx: MacroContext) -> Self {
        Self { ctx }
    }

    /// Expand a file name (or path) template for `original_name`.
    ///
    /// Order: context macros, origin macros, file mask. A result ending in a
    /// separator gets the original name appended. An empty template keeps the
    /// original name.
    pub fn expand(&self, template: &str, original_name: &str) -> TransferResult<String> {
        reject_reserved(original_name, "File name")?;
        if template.trim().is_empty() {
            return Ok(original_name.to_string());
        }

        let expanded = self.expand_context_macros(template);
        let expanded = expand_origin_macros(&expanded, original_name);
        let mut expanded = expand_file_mask(&expanded, original_name);

        if ends_with_separator(&expanded) {
            expanded.push_str(original_name);
        }
        reject_reserved(&expanded, "Expanded file name")?;
        Ok(expanded)
    }

    /// Expand a directory template. Origin macros are rejected: a file's name
    /// is undefined at the directory level.
    pub fn expand_directory(&self, template: &str) -> TransferResult<String> {
        for (m, re) in ORIGIN_PATTERNS.iter() {
            if re.is_match(template) {
                return Err(TransferError::invalid_input(format!(
                    "Macro {} cannot be used in directory '{}'",
                    m.token(),
                    template
                )));
            }
        }
        Ok(self.expand_context_macros(template))
    }

    fn expand_context_macros(&self, template: &str) -> String {
        if !template.contains('%') {
            return template.to_string();
        }
        let mut out = template.to_string();
        for (m, re) in CONTEXT_PATTERNS.iter() {
            if re.is_match(&out) {
                out = re
                    .replace_all(&out, |_: &Captures| m.expand(&self.ctx))
                    .into_owned();
            }
        }
        out
    }
}

fn expand_origin_macros(template: &str, original_name: &str) -> String {
    if !template.contains('%') {
        return template.to_string();
    }
    let mut out = template.to_string();
    for (m, re) in ORIGIN_PATTERNS.iter() {
        let value = m.expand(original_name);
        out = re.replace_all(&out, |_: &Captures| value.clone()).into_owned();
    }
    out
}

/// Substitute the original base name at the first `*`. Later `*`s in the
/// suffix stand for the original extension; when the suffix carries no
/// extension of its own the original one is re-appended. `?` only marks the
/// template as a mask and is left in place.
fn expand_file_mask(template: &str, original_name: &str) -> String {
    if !is_file_mask(template) {
        return template.to_string();
    }
    let Some(idx) = template.find('*') else {
        return template.to_string();
    };

    let (stem, ext) = split_extension(original_name);
    let prefix = &template[..idx];
    let suffix = template[idx + 1..].replace('*', ext.trim_start_matches('.'));

    if suffix.contains('.') {
        format!("{prefix}{stem}{suffix}")
    } else {
        format!("{prefix}{stem}{suffix}{ext}")
    }
}

// ── Source masks ─────────────────────────────────────────────────────────────

/// Matcher for source file names: exact name, wildcard mask or `<regex>`.
#[derive(Debug, Clone)]
pub struct FileMask {
    raw: String,
    regex: Regex,
}

impl FileMask {
    pub fn new(mask: &str) -> TransferResult<Self> {
        let pattern = match mask.strip_prefix("<regex>") {
            Some(expr) => format!("(?i){expr}"),
            None => translate_mask(mask),
        };
        let regex = Regex::new(&pattern).map_err(|e| {
            TransferError::invalid_input(format!("Invalid file mask '{}': {}", mask, e))
        })?;
        Ok(Self {
            raw: mask.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        name == self.raw || self.regex.is_match(name)
    }
}

/// `.` literal, `*` any run, `?` at least one character, anchored,
/// case-insensitive.
fn translate_mask(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len() + 8);
    out.push_str("(?i)^");
    for c in mask.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push_str(".+"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> MacroEngine {
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 10, 7, 8, 9)
            .unwrap();
        MacroEngine::new(MacroContext::at(now, "nightly", "ab12cd34-0000-0000-0000-000000000000"))
    }

    // ── Context macros ──────────────────────────────────────────────────

    #[test]
    fn date_tokens_are_case_insensitive() {
        let e = engine();
        assert_eq!(e.expand("%year%-%MONTH%-%Day%.csv", "a.txt").unwrap(), "2024-03-10.csv");
        assert_eq!(e.expand("%Date%_%Time%", "a.txt").unwrap(), "2024-03-10_07-08-09");
    }

    #[test]
    fn datetime_variants() {
        let e = engine();
        assert_eq!(e.expand("x_%DateTime%.log", "a").unwrap(), "x_2024-03-10-07-08-09.log");
        assert_eq!(
            e.expand("x_%DateTimeMs%.log", "a").unwrap(),
            "x_2024-03-10-07-08-09-000.log"
        );
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let e = engine();
        assert_eq!(e.expand("%Year%_%Year%.txt", "a").unwrap(), "2024_2024.txt");
    }

    #[test]
    fn transfer_name_and_id() {
        let e = engine();
        assert_eq!(
            e.expand("%TransferName%-%TransferId%.dat", "a").unwrap(),
            "nightly-AB12CD34-0000-0000-0000-000000000000.dat"
        );
    }

    #[test]
    fn weekday_is_iso_numbered() {
        // 2024-03-10 is a Sunday.
        let e = engine();
        assert_eq!(e.expand("%WeekDay%.txt", "a").unwrap(), "7.txt");
    }

    #[test]
    fn ticks_match_dotnet_epoch() {
        let e = engine();
        let ticks: i64 = e
            .expand("%Ticks%.x", "a")
            .unwrap()
            .trim_end_matches(".x")
            .parse()
            .unwrap();
        let expected = 1_710_054_489i64 * 10_000_000 + EPOCH_TICKS;
        assert_eq!(ticks, expected);
    }

    #[test]
    fn guid_is_fresh_per_occurrence() {
        let e = engine();
        let out = e.expand("%Guid%_%Guid%.x", "a").unwrap();
        let parts: Vec<&str> = out.trim_end_matches(".x").split('_').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 36);
        assert_ne!(parts[0], parts[1]);
    }

    #[test]
    fn transfer_name_with_dollar_is_literal() {
        let now = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let e = MacroEngine::new(MacroContext::at(now, "cost$1", "id"));
        assert_eq!(e.expand("%TransferName%.txt", "a").unwrap(), "cost$1.txt");
    }

    // ── Origin macros ───────────────────────────────────────────────────

    #[test]
    fn source_name_and_extension() {
        let e = engine();
        assert_eq!(
            e.expand("%SourceFileName%_%Date%%SourceFileExtension%", "report.final.csv").unwrap(),
            "report.final_2024-03-10.csv"
        );
        assert_eq!(e.expand("%sourcefilename%.bak", "README").unwrap(), "README.bak");
        assert_eq!(e.expand("x%SourceFileExtension%", "README").unwrap(), "x");
    }

    #[test]
    fn split_extension_edge_cases() {
        assert_eq!(split_extension("a.txt"), ("a", ".txt"));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
    }

    // ── Masks ───────────────────────────────────────────────────────────

    #[test]
    fn star_substitutes_base_name() {
        let e = engine();
        assert_eq!(e.expand("*.bak", "a.txt").unwrap(), "a.bak");
        assert_eq!(e.expand("backup_*", "a.txt").unwrap(), "backup_a.txt");
        assert_eq!(e.expand("pre_*_post.csv", "data.txt").unwrap(), "pre_data_post.csv");
        assert_eq!(e.expand("*", "data.txt").unwrap(), "data.txt");
        assert_eq!(e.expand("*.*", "data.txt").unwrap(), "data.txt");
    }

    #[test]
    fn mask_runs_after_macros() {
        let e = engine();
        assert_eq!(e.expand("%Year%_*", "a.txt").unwrap(), "2024_a.txt");
    }

    #[test]
    fn question_mark_never_substitutes() {
        let e = engine();
        let err = e.expand("file?.txt", "a.txt").unwrap_err();
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::InvalidInput);
    }

    #[test]
    fn original_name_with_question_mark_fails() {
        let e = engine();
        assert!(e.expand("*.txt", "what?.txt").is_err());
    }

    #[test]
    fn trailing_separator_appends_original_name() {
        let e = engine();
        assert_eq!(e.expand("/archive/%Year%/", "a.txt").unwrap(), "/archive/2024/a.txt");
        assert_eq!(e.expand("C:\\out\\", "a.txt").unwrap(), "C:\\out\\a.txt");
    }

    #[test]
    fn plain_template_is_unchanged() {
        let e = engine();
        for t in ["result.csv", "/data/in/result.csv", "100% done.txt", "a.b.c"] {
            assert_eq!(e.expand(t, "orig.txt").unwrap(), t);
        }
    }

    #[test]
    fn empty_template_keeps_original() {
        let e = engine();
        assert_eq!(e.expand("", "orig.txt").unwrap(), "orig.txt");
    }

    // ── Directories ─────────────────────────────────────────────────────

    #[test]
    fn directory_expands_context_macros() {
        let e = engine();
        assert_eq!(e.expand_directory("/out/%Year%/%Month%").unwrap(), "/out/2024/03");
        assert_eq!(e.expand_directory("/out/*").unwrap(), "/out/*");
    }

    #[test]
    fn directory_rejects_origin_macros() {
        let e = engine();
        let err = e.expand_directory("/out/%SOURCEFILENAME%").unwrap_err();
        assert!(err.message.contains("%SourceFileName%"));
        assert!(e.expand_directory("/out/%SourceFileExtension%").is_err());
    }

    // ── Source masks ────────────────────────────────────────────────────

    #[test]
    fn file_mask_translation() {
        let m = FileMask::new("*.txt").unwrap();
        assert!(m.matches("a.txt"));
        assert!(m.matches("A.TXT"));
        assert!(!m.matches("a.txt.bak"));
        assert!(!m.matches("atxt"));

        let m = FileMask::new("data_?.csv").unwrap();
        assert!(m.matches("data_1.csv"));
        assert!(m.matches("data_123.csv"));
        assert!(!m.matches("data_.csv"));
    }

    #[test]
    fn file_mask_escapes_other_metacharacters() {
        let m = FileMask::new("report(1)+.txt").unwrap();
        assert!(m.matches("report(1)+.txt"));
        assert!(!m.matches("report11.txt"));
    }

    #[test]
    fn file_mask_regex_prefix() {
        let m = FileMask::new("<regex>^inv_\\d{4}\\.xml$").unwrap();
        assert!(m.matches("inv_2024.xml"));
        assert!(!m.matches("inv_24.xml"));
        assert!(FileMask::new("<regex>([").is_err());
    }
}

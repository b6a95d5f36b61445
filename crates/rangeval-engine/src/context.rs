//! Evaluation context for compiled validators
//!
//! Everything a validator reads besides the submitted value: the rest of the
//! record, the reserved sentinels, subject-level specials, today's date and
//! the record source used by cross-table lookups.

use chrono::NaiveDate;
use rangeval_catalog::RecordSource;
use rangeval_core::{Config, Sentinels};
use rangeval_dsl::SpecialVar;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ValidationContext {
    /// Other fields of the record being validated, raw
    record: HashMap<String, String>,
    sentinels: Sentinels,
    track_code: Option<String>,
    highest_visit: Option<String>,
    enroll_date: Option<String>,
    enroll_group: Option<String>,
    today: NaiveDate,
    records: Option<Arc<dyn RecordSource>>,
    lookup_timeout: Duration,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self {
            record: HashMap::new(),
            sentinels: Sentinels::default(),
            track_code: None,
            highest_visit: None,
            enroll_date: None,
            enroll_group: None,
            today: chrono::Local::now().date_naive(),
            records: None,
            lookup_timeout: Duration::from_millis(2000),
        }
    }

    /// Context carrying the configured sentinels and lookup timeout
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_sentinels(config.sentinels.clone())
            .with_lookup_timeout(config.lookup.timeout())
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.insert(field.into(), value.into());
        self
    }

    pub fn with_record(mut self, record: HashMap<String, String>) -> Self {
        self.record.extend(record);
        self
    }

    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn with_track_code(mut self, track: impl Into<String>) -> Self {
        self.track_code = Some(track.into());
        self
    }

    pub fn with_highest_visit(mut self, visit: impl Into<String>) -> Self {
        self.highest_visit = Some(visit.into());
        self
    }

    pub fn with_enroll_date(mut self, date: impl Into<String>) -> Self {
        self.enroll_date = Some(date.into());
        self
    }

    pub fn with_enroll_group(mut self, group: impl Into<String>) -> Self {
        self.enroll_group = Some(group.into());
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_record_source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.records = Some(source);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Raw value of another field of the record
    pub fn field(&self, name: &str) -> Option<&str> {
        self.record.get(name).map(String::as_str)
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.sentinels
    }

    /// Raw value of a special variable; `x` is not held here
    pub fn special(&self, special: SpecialVar) -> Option<&str> {
        match special {
            SpecialVar::Current => None,
            SpecialVar::Missing => Some(&self.sentinels.missing),
            SpecialVar::NotApplicable => Some(&self.sentinels.not_applicable),
            SpecialVar::TrackCode => self.track_code.as_deref(),
            SpecialVar::HighestVisit => self.highest_visit.as_deref(),
            SpecialVar::EnrollDate => self.enroll_date.as_deref(),
            SpecialVar::EnrollGroup => self.enroll_group.as_deref(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn record_source(&self) -> Option<&Arc<dyn RecordSource>> {
        self.records.as_ref()
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("record", &self.record)
            .field("sentinels", &self.sentinels)
            .field("track_code", &self.track_code)
            .field("highest_visit", &self.highest_visit)
            .field("enroll_date", &self.enroll_date)
            .field("enroll_group", &self.enroll_group)
            .field("today", &self.today)
            .field("records", &self.records.as_ref().map(|r| r.name()))
            .field("lookup_timeout", &self.lookup_timeout)
            .finish()
    }
}

/// Context file accepted by `rangeval eval --context`
///
/// ```json
/// { "record": { "sex": "2" }, "track": "A", "today": "2024-06-01" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContextFile {
    #[serde(default)]
    pub record: HashMap<String, String>,

    #[serde(default)]
    pub track: Option<String>,

    #[serde(default)]
    pub hivisit: Option<String>,

    #[serde(default)]
    pub enrolldate: Option<String>,

    #[serde(default)]
    pub enrollgroup: Option<String>,

    #[serde(default)]
    pub today: Option<NaiveDate>,
}

impl ContextFile {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Layer the file's values over `context`
    pub fn apply(self, context: ValidationContext) -> ValidationContext {
        let mut context = context.with_record(self.record);
        if let Some(track) = self.track {
            context = context.with_track_code(track);
        }
        if let Some(visit) = self.hivisit {
            context = context.with_highest_visit(visit);
        }
        if let Some(date) = self.enrolldate {
            context = context.with_enroll_date(date);
        }
        if let Some(group) = self.enrollgroup {
            context = context.with_enroll_group(group);
        }
        if let Some(today) = self.today {
            context = context.with_today(today);
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specials_come_from_context() {
        let ctx = ValidationContext::new()
            .with_sentinels(Sentinels {
                missing: "M".into(),
                not_applicable: "NA".into(),
            })
            .with_track_code("B");

        assert_eq!(ctx.special(SpecialVar::Missing), Some("M"));
        assert_eq!(ctx.special(SpecialVar::NotApplicable), Some("NA"));
        assert_eq!(ctx.special(SpecialVar::TrackCode), Some("B"));
        assert_eq!(ctx.special(SpecialVar::HighestVisit), None);
        assert_eq!(ctx.special(SpecialVar::Current), None);
    }

    #[test]
    fn config_sets_timeout_and_sentinels() {
        let config = Config::from_toml(
            r#"
            [sentinels]
            not_applicable = "."

            [lookup]
            timeout_ms = 50
            "#,
        )
        .unwrap();

        let ctx = ValidationContext::from_config(&config);
        assert_eq!(ctx.lookup_timeout(), Duration::from_millis(50));
        assert_eq!(ctx.sentinels().not_applicable, ".");
        assert!(ctx.record_source().is_none());
    }

    #[test]
    fn context_file_layers_over_context() {
        let file = ContextFile::from_json(
            r#"{ "record": { "sex": "2" }, "hivisit": "3", "today": "2024-06-01" }"#,
        )
        .unwrap();

        let ctx = file.apply(ValidationContext::new().with_field("age", "40"));
        assert_eq!(ctx.field("sex"), Some("2"));
        assert_eq!(ctx.field("age"), Some("40"));
        assert_eq!(ctx.special(SpecialVar::HighestVisit), Some("3"));
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }
}

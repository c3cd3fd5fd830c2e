//! Event log readers.
//!
//! Flat logs (one case per event):
//!
//! - JSON lines: `{"case_id": "c1", "activity": "A", "timestamp": "...", ...}`
//! - CSV with a header naming at least the case, activity and timestamp
//!   columns
//!
//! The XES attribute names `case:concept:name`, `concept:name` and
//! `time:timestamp` are accepted as aliases; any other field becomes an
//! event attribute.
//!
//! Object-centric logs:
//!
//! - OCEL JSON lines: `{"ocel:eid", "ocel:activity", "ocel:timestamp",
//!   "ocel:omap": {"Order": ["o1"]}, "ocel:vmap": {...}}`
//! - OCEL 1.0 JSON documents (`ocel:events` / `ocel:objects`)
//! - OCEL 2.0 JSON documents (`events` / `objects` with relationships)
//!
//! Every reader returns its events sorted by timestamp; events with equal
//! timestamps keep their file order.

use crate::stream::{Source, StreamSender};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use procflow_core::{AttributeValue, Event, MiningError, ObjectCentricEvent, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CASE_KEYS: [&str; 2] = ["case_id", "case:concept:name"];
const ACTIVITY_KEYS: [&str; 2] = ["activity", "concept:name"];
const TIMESTAMP_KEYS: [&str; 2] = ["timestamp", "time:timestamp"];

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DD HH:MM:SS[.f]` one
/// taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(MiningError::input(format!("invalid timestamp '{}'", text)))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn take_field(object: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| object.remove(*key))
}

fn require_text(object: &mut Map<String, Value>, keys: &[&str], line: usize) -> Result<String> {
    take_field(object, keys)
        .as_ref()
        .and_then(value_text)
        .ok_or_else(|| MiningError::input(format!("line {}: missing '{}'", line, keys[0])))
}

/// Format of a flat log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatFormat {
    JsonLines,
    Csv,
}

impl FlatFormat {
    /// `.csv` is CSV, anything else JSON lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => FlatFormat::Csv,
            _ => FlatFormat::JsonLines,
        }
    }
}

/// Parse a flat JSON-lines log. Blank lines and `#` comments are skipped.
pub fn parse_json_lines(text: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = index + 1;
        let mut object: Map<String, Value> = serde_json::from_str(line)
            .map_err(|e| MiningError::input(format!("line {}: {}", number, e)))?;

        let case_id = require_text(&mut object, &CASE_KEYS, number)?;
        let activity = require_text(&mut object, &ACTIVITY_KEYS, number)?;
        let timestamp = parse_timestamp(&require_text(&mut object, &TIMESTAMP_KEYS, number)?)?;

        let mut event = Event::at(case_id, activity, timestamp);
        for (key, value) in &object {
            event.attributes.insert(key.clone(), AttributeValue::from_json(value));
        }
        events.push(event);
    }
    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Parse a CSV log with a header row. Quoted fields may contain commas.
pub fn parse_csv(text: &str) -> Result<Vec<Event>> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let Some((_, header)) = lines.next() else {
        return Ok(Vec::new());
    };
    let header = split_csv_line(header);
    let column = |keys: &[&str]| {
        header
            .iter()
            .position(|h| keys.contains(&h.as_str()))
            .ok_or_else(|| MiningError::input(format!("CSV header has no '{}' column", keys[0])))
    };
    let case_column = column(&CASE_KEYS)?;
    let activity_column = column(&ACTIVITY_KEYS)?;
    let timestamp_column = column(&TIMESTAMP_KEYS)?;

    let mut events = Vec::new();
    for (index, line) in lines {
        let fields = split_csv_line(line);
        if fields.len() != header.len() {
            return Err(MiningError::input(format!(
                "line {}: expected {} fields, found {}",
                index + 1,
                header.len(),
                fields.len()
            )));
        }
        let mut event = Event::at(
            fields[case_column].as_str(),
            fields[activity_column].as_str(),
            parse_timestamp(&fields[timestamp_column])?,
        );
        for (i, (name, value)) in header.iter().zip(&fields).enumerate() {
            if i != case_column && i != activity_column && i != timestamp_column {
                event.attributes.insert(name.clone(), AttributeValue::from(value.as_str()));
            }
        }
        events.push(event);
    }
    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

pub fn parse_event_log(text: &str, format: FlatFormat) -> Result<Vec<Event>> {
    match format {
        FlatFormat::JsonLines => parse_json_lines(text),
        FlatFormat::Csv => parse_csv(text),
    }
}

/// Read and parse a flat log, choosing the format from the extension.
pub fn read_event_log(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| MiningError::io(format!("{}: {}", path.display(), e)))?;
    parse_event_log(&text, FlatFormat::from_path(path))
}

#[derive(Deserialize)]
struct OcelLine {
    #[serde(rename = "ocel:eid")]
    eid: Value,
    #[serde(rename = "ocel:activity")]
    activity: String,
    #[serde(rename = "ocel:timestamp")]
    timestamp: String,
    #[serde(rename = "ocel:omap")]
    omap: BTreeMap<String, BTreeSet<String>>,
    #[serde(rename = "ocel:vmap", default)]
    vmap: Map<String, Value>,
}

/// Parse OCEL JSON lines.
pub fn parse_ocel_lines(text: &str) -> Result<Vec<ObjectCentricEvent>> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record: OcelLine = serde_json::from_str(line)
            .map_err(|e| MiningError::input(format!("line {}: {}", index + 1, e)))?;
        let event_id = value_text(&record.eid)
            .ok_or_else(|| MiningError::input(format!("line {}: invalid ocel:eid", index + 1)))?;
        let mut event = ObjectCentricEvent::new(
            event_id,
            record.activity,
            parse_timestamp(&record.timestamp)?,
        );
        event.omap = record.omap;
        for (key, value) in &record.vmap {
            event.vmap.insert(key.clone(), AttributeValue::from_json(value));
        }
        event.validate()?;
        events.push(event);
    }
    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

#[derive(Deserialize)]
struct Ocel1Event {
    #[serde(rename = "ocel:activity")]
    activity: String,
    #[serde(rename = "ocel:timestamp")]
    timestamp: String,
    #[serde(rename = "ocel:omap", default)]
    omap: Vec<String>,
    #[serde(rename = "ocel:vmap", default)]
    vmap: Map<String, Value>,
}

#[derive(Deserialize)]
struct Ocel1Object {
    #[serde(rename = "ocel:type")]
    object_type: String,
}

#[derive(Deserialize)]
struct Ocel1Log {
    #[serde(rename = "ocel:events")]
    events: BTreeMap<String, Ocel1Event>,
    #[serde(rename = "ocel:objects", default)]
    objects: BTreeMap<String, Ocel1Object>,
}

#[derive(Deserialize)]
struct Ocel2Relationship {
    #[serde(rename = "objectId")]
    object_id: String,
}

#[derive(Deserialize)]
struct Ocel2Attribute {
    name: String,
    value: Value,
}

#[derive(Deserialize)]
struct Ocel2Event {
    id: String,
    #[serde(rename = "type")]
    activity: String,
    time: String,
    #[serde(default)]
    attributes: Vec<Ocel2Attribute>,
    #[serde(default)]
    relationships: Vec<Ocel2Relationship>,
}

#[derive(Deserialize)]
struct Ocel2Object {
    id: String,
    #[serde(rename = "type")]
    object_type: String,
}

#[derive(Deserialize)]
struct Ocel2Log {
    events: Vec<Ocel2Event>,
    #[serde(default)]
    objects: Vec<Ocel2Object>,
}

fn resolve_objects<'a, I>(
    event_id: &str,
    ids: I,
    types: &BTreeMap<&str, &str>,
) -> Result<BTreeMap<String, BTreeSet<String>>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut omap: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for id in ids {
        let object_type = types.get(id).ok_or_else(|| {
            MiningError::input(format!("event '{}' references unknown object '{}'", event_id, id))
        })?;
        omap.entry(object_type.to_string())
            .or_default()
            .insert(id.to_string());
    }
    Ok(omap)
}

fn from_ocel1(log: Ocel1Log) -> Result<Vec<ObjectCentricEvent>> {
    let types: BTreeMap<&str, &str> = log
        .objects
        .iter()
        .map(|(id, object)| (id.as_str(), object.object_type.as_str()))
        .collect();
    let mut events = Vec::with_capacity(log.events.len());
    for (id, record) in &log.events {
        let mut event = ObjectCentricEvent::new(
            id.as_str(),
            record.activity.as_str(),
            parse_timestamp(&record.timestamp)?,
        );
        event.omap = resolve_objects(id, record.omap.iter().map(String::as_str), &types)?;
        for (key, value) in &record.vmap {
            event.vmap.insert(key.clone(), AttributeValue::from_json(value));
        }
        events.push(event);
    }
    Ok(events)
}

fn from_ocel2(log: Ocel2Log) -> Result<Vec<ObjectCentricEvent>> {
    let types: BTreeMap<&str, &str> = log
        .objects
        .iter()
        .map(|object| (object.id.as_str(), object.object_type.as_str()))
        .collect();
    let mut events = Vec::with_capacity(log.events.len());
    for record in &log.events {
        let mut event = ObjectCentricEvent::new(
            record.id.as_str(),
            record.activity.as_str(),
            parse_timestamp(&record.time)?,
        );
        event.omap = resolve_objects(
            &record.id,
            record.relationships.iter().map(|r| r.object_id.as_str()),
            &types,
        )?;
        for attribute in &record.attributes {
            event
                .vmap
                .insert(attribute.name.clone(), AttributeValue::from_json(&attribute.value));
        }
        events.push(event);
    }
    Ok(events)
}

/// Parse an OCEL 1.0 or 2.0 JSON document. Events without objects are
/// dropped, since no object type could route them.
pub fn parse_ocel_document(text: &str) -> Result<Vec<ObjectCentricEvent>> {
    let document: Value = serde_json::from_str(text)?;
    let mut events = if document.get("ocel:events").is_some() {
        from_ocel1(serde_json::from_value(document)?)?
    } else if document.get("events").is_some() {
        from_ocel2(serde_json::from_value(document)?)?
    } else {
        return Err(MiningError::input(
            "not an OCEL document: no 'ocel:events' or 'events'",
        ));
    };
    let total = events.len();
    events.retain(|e| !e.omap.is_empty());
    if events.len() < total {
        debug!(dropped = total - events.len(), "Events without objects dropped");
    }
    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

/// Read an object-centric log: `.jsonl` as OCEL lines, anything else as an
/// OCEL document.
pub fn read_ocel(path: impl AsRef<Path>) -> Result<Vec<ObjectCentricEvent>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| MiningError::io(format!("{}: {}", path.display(), e)))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") | Some("ndjson") => parse_ocel_lines(&text),
        _ => parse_ocel_document(&text),
    }
}

async fn emit_all<T: Send>(sender: &StreamSender<T>, items: Vec<T>) -> Result<()> {
    let total = items.len();
    for (sent, item) in items.into_iter().enumerate() {
        if sender.send(item).await.is_err() {
            debug!(stream = %sender.name, sent, total, "Consumer closed, stopping source");
            return Ok(());
        }
    }
    Ok(())
}

/// Source reading a flat log file when the stream starts.
pub struct EventLogSource {
    name: String,
    path: PathBuf,
}

impl EventLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("log:{}", path.display()),
            path,
        }
    }
}

#[async_trait]
impl Source<Event> for EventLogSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, sender: &StreamSender<Event>) -> Result<()> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MiningError::io(format!("{}: {}", self.path.display(), e)))?;
        let events = parse_event_log(&text, FlatFormat::from_path(&self.path))?;
        info!(path = %self.path.display(), events = events.len(), "Event log loaded");
        emit_all(sender, events).await
    }
}

/// Source reading an object-centric log file when the stream starts.
pub struct OcelSource {
    name: String,
    path: PathBuf,
}

impl OcelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("ocel:{}", path.display()),
            path,
        }
    }
}

#[async_trait]
impl Source<ObjectCentricEvent> for OcelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, sender: &StreamSender<ObjectCentricEvent>) -> Result<()> {
        let path = self.path.clone();
        let events = tokio::task::spawn_blocking(move || read_ocel(path))
            .await
            .map_err(|e| MiningError::io(format!("log reader task failed: {}", e)))??;
        info!(path = %self.path.display(), events = events.len(), "Object-centric log loaded");
        emit_all(sender, events).await
    }
}

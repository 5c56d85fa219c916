// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// InfluxDB line protocol encoding

use crate::device::FieldValue;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// A single time-series point
///
/// `measurement,tag=a,tag=b field=1,field="x" 1700000000000000000`
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp_ns: Option<i64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ns: None,
        }
    }

    /// Add a tag. Empty values are dropped; line protocol does not allow them.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.tags.push((key.into(), value));
        }
        self
    }

    /// Add a field. Non-finite floats are dropped.
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        if let FieldValue::Float(f) = value {
            if !f.is_finite() {
                return self;
            }
        }
        self.fields.push((key.into(), value));
        self
    }

    pub fn float_field(self, key: impl Into<String>, value: f64) -> Self {
        self.field(key, FieldValue::Float(value))
    }

    pub fn boolean_field(self, key: impl Into<String>, value: bool) -> Self {
        self.field(key, FieldValue::Boolean(value))
    }

    pub fn string_field(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(key, FieldValue::Text(value.into()))
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp_ns = timestamp.timestamp_nanos_opt();
        self
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Encode as one line of line protocol (no trailing newline)
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);

        let mut tags: Vec<_> = self.tags.iter().collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in tags {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }

        for (i, (key, value)) in self.fields.iter().enumerate() {
            line.push(if i == 0 { ' ' } else { ',' });
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            match value {
                FieldValue::Float(f) => {
                    let _ = write!(line, "{}", f);
                }
                FieldValue::Boolean(b) => {
                    let _ = write!(line, "{}", b);
                }
                FieldValue::Text(s) => {
                    let _ = write!(line, "\"{}\"", escape(s, &['"', '\\']));
                }
            }
        }

        if let Some(ts) = self.timestamp_ns {
            let _ = write!(line, " {}", ts);
        }

        line
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

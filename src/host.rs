#![crate_name = "host"]
// MIT License
//
// Copyright (c) 2016 Alexander Thaller <alexander.thaller@trivago.com>
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

extern crate chrono;
extern crate serde;
extern crate serde_json;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::UTC;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap as Map;
use std::error;
use std::fmt;
use std::io::Read;

#[derive(Debug)]
pub enum Error {
    InvalidPayload,
    MalformedJson(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidPayload => write!(f, "no \"host\" in payload"),
            Error::MalformedJson(ref err) => write!(f, "malformed json in payload: {}", err),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&error::Error> {
        match *self {
            Error::InvalidPayload => None,
            Error::MalformedJson(ref err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inet {
    pub addr: String,
}

impl Inet {
    pub fn new(addr: &str) -> Inet {
        Inet { addr: String::from(addr) }
    }
}

impl fmt::Display for Inet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullString {
    pub string: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hstore {
    pub map: Map<String, NullString>,
}

impl Hstore {
    pub fn new() -> Hstore {
        Hstore { map: Map::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub ip: Inet,
    pub package: NullString,
    pub image: NullString,
    pub hosttype: NullString,
    pub tags: Hstore,
    pub vars: Hstore,
    pub modified: DateTime<UTC>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct HostJson {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub hosttype: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HostPayload {
    #[serde(default)]
    pub host: Option<HostJson>,
}

fn is_zero(id: &i64) -> bool {
    *id == 0
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ip)
    }
}

impl Host {
    pub fn new() -> Host {
        Host {
            id: 0,
            name: String::new(),
            ip: Inet::new(""),
            package: NullString::default(),
            image: NullString::default(),
            hosttype: NullString::default(),
            tags: Hstore::new(),
            vars: Hstore::new(),
            modified: UTC.timestamp(0, 0),
        }
    }

    pub fn to_json(&self) -> HostJson {
        let mut hj = HostJson {
            id: self.id,
            name: self.name.clone(),
            ip: self.ip.addr.clone(),
            package: self.package.string.clone(),
            image: self.image.string.clone(),
            hosttype: self.hosttype.string.clone(),
            tags: Map::new(),
            vars: Map::new(),
        };

        // stored keys and values are already lower-cased, nothing gets
        // re-normalized on the way out
        for (key, value) in &self.tags.map {
            hj.tags.insert(key.clone(), Value::String(value.string.clone()));
        }

        for (key, value) in &self.vars.map {
            hj.vars.insert(key.clone(), Value::String(value.string.clone()));
        }

        hj
    }

    pub fn collapsed_vars(&self) -> Map<String, String> {
        let mut vars_map = Map::new();

        vars_map.insert(String::from("hostname"), self.name.to_lowercase());
        vars_map.insert(String::from("image"), self.image.string.to_lowercase());
        vars_map.insert(String::from("ip"), self.ip.addr.clone());
        vars_map.insert(String::from("modified"), self.modified.to_rfc3339());
        vars_map.insert(String::from("package"), self.package.string.to_lowercase());
        vars_map.insert(String::from("type"), self.hosttype.string.to_lowercase());

        // overlay order is base -> tags -> vars, vars win on collision
        for (key, value) in &self.tags.map {
            vars_map.insert(key.to_lowercase(), value.string.to_lowercase());
        }

        for (key, value) in &self.vars.map {
            vars_map.insert(key.to_lowercase(), value.string.to_lowercase());
        }

        vars_map
    }
}

impl Default for Host {
    fn default() -> Host {
        Host::new()
    }
}

impl HostJson {
    pub fn new() -> HostJson {
        HostJson {
            id: 0,
            name: String::new(),
            ip: String::new(),
            package: String::new(),
            image: String::new(),
            hosttype: String::new(),
            tags: Map::new(),
            vars: Map::new(),
        }
    }

    pub fn to_host(&self) -> Host {
        let mut host = Host {
            id: self.id,
            name: self.name.clone(),
            ip: Inet::new(self.ip.as_str()),
            package: NullString {
                string: self.package.clone(),
                valid: true,
            },
            image: NullString {
                string: self.image.clone(),
                valid: true,
            },
            hosttype: NullString {
                string: self.hosttype.clone(),
                valid: true,
            },
            tags: Hstore::new(),
            vars: Hstore::new(),
            modified: UTC.timestamp(0, 0),
        };

        // source keys iterate in sorted order, so two keys that fold to the
        // same lower-cased key resolve to the later one deterministically
        for (key, value) in &self.tags {
            host.tags.map.insert(key.to_lowercase(),
                                 NullString {
                                     string: value_to_string(value).to_lowercase(),
                                     valid: true,
                                 });
        }

        for (key, value) in &self.vars {
            host.vars.map.insert(key.to_lowercase(),
                                 NullString {
                                     string: value_to_string(value).to_lowercase(),
                                     valid: true,
                                 });
        }

        host
    }
}

pub fn value_to_string(value: &Value) -> String {
    match *value {
        Value::String(ref s) => s.clone(),
        ref other => other.to_string(),
    }
}

pub fn host_json_from_body<R: Read>(mut body: R) -> Result<HostJson, Error> {
    let mut buf = Vec::new();
    if body.read_to_end(&mut buf).is_err() {
        return Err(Error::InvalidPayload);
    }

    // one value is read from the stream, bytes after a complete envelope are
    // left alone
    let mut de = serde_json::Deserializer::from_slice(&buf);
    match HostPayload::deserialize(&mut de) {
        Ok(payload) => {
            match payload.host {
                Some(hj) => Ok(hj),
                None => Err(Error::InvalidPayload),
            }
        }
        Err(err) => {
            debug!("payload did not decode: {}", err);

            // a missing "host" key outranks the parse error, so look for the
            // envelope key before reporting the body as malformed
            let mut de = serde_json::Deserializer::from_slice(&buf);
            match Value::deserialize(&mut de) {
                Ok(ref value) if value.get("host").map_or(false, |hj| !hj.is_null()) => {
                    Err(Error::MalformedJson(err))
                }
                _ => Err(Error::InvalidPayload),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;
    use serde_json::Value;
    use std::collections::BTreeMap as Map;

    fn attrs(pairs: &[(&str, &str)]) -> Hstore {
        let mut store = Hstore::new();
        for &(key, value) in pairs {
            store.map.insert(String::from(key),
                             NullString {
                                 string: String::from(value),
                                 valid: true,
                             });
        }
        store
    }

    #[test]
    fn payload_without_host_is_invalid() {
        let err = host_json_from_body(r#"{"name": "web1"}"#.as_bytes()).unwrap_err();
        match err {
            Error::InvalidPayload => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn payload_with_null_host_is_invalid() {
        let err = host_json_from_body(r#"{"host": null}"#.as_bytes()).unwrap_err();
        match err {
            Error::InvalidPayload => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn payload_without_host_is_invalid_even_when_body_is_broken() {
        let err = host_json_from_body(r#"{"answer": [42,}"#.as_bytes()).unwrap_err();
        match err {
            Error::InvalidPayload => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn payload_with_host_but_broken_body_is_malformed() {
        let err = host_json_from_body(r#"{"host": {"id": "nope"}}"#.as_bytes()).unwrap_err();
        match err {
            Error::MalformedJson(_) => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn payload_with_non_object_host_is_malformed() {
        let err = host_json_from_body(r#"{"host": "web1"}"#.as_bytes()).unwrap_err();
        match err {
            Error::MalformedJson(_) => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn payload_ignores_trailing_bytes_after_envelope() {
        let hj = host_json_from_body(r#"{"host": {"name": "web1", "ip": "10.0.0.5"}}garbage"#
                .as_bytes())
            .unwrap();
        assert_eq!(hj.name, "web1");
        assert_eq!(hj.ip, "10.0.0.5");
    }

    #[test]
    fn converted_host_lower_cases_tag_keys_and_values() {
        let mut hj = HostJson::new();
        hj.tags.insert(String::from("Role"), Value::String(String::from("Web")));

        let host = hj.to_host();
        assert_eq!(host.tags.map.get("role"),
                   Some(&NullString {
                       string: String::from("web"),
                       valid: true,
                   }));
        assert_eq!(host.tags.map.get("Role"), None);
    }

    #[test]
    fn converted_host_coerces_scalar_values_to_strings() {
        let mut hj = HostJson::new();
        hj.vars.insert(String::from("Count"), Value::from(2));
        hj.vars.insert(String::from("Enabled"), Value::from(true));
        hj.vars.insert(String::from("Ratio"), Value::from(1.5));

        let host = hj.to_host();
        assert_eq!(host.vars.map.get("count").unwrap().string, "2");
        assert_eq!(host.vars.map.get("enabled").unwrap().string, "true");
        assert_eq!(host.vars.map.get("ratio").unwrap().string, "1.5");
    }

    #[test]
    fn round_trip_preserves_identity_and_lower_cased_attrs() {
        let mut hj = HostJson::new();
        hj.id = 7;
        hj.name = String::from("WEB1");
        hj.ip = String::from("10.0.0.5");
        hj.package = String::from("nginx");
        hj.tags.insert(String::from("Env"), Value::String(String::from("Prod")));

        let back = hj.to_host().to_json();
        assert_eq!(back.id, 7);
        assert_eq!(back.name, "WEB1");
        assert_eq!(back.ip, "10.0.0.5");
        assert_eq!(back.package, "nginx");
        assert_eq!(back.tags.get("env"),
                   Some(&Value::String(String::from("prod"))));
        assert_eq!(back.tags.get("Env"), None);
    }

    #[test]
    fn collapsed_vars_lower_cases_hostname_but_not_ip() {
        let mut host = Host::new();
        host.name = String::from("WEB1");
        host.ip = Inet::new("2001:DB8::1");

        let vars = host.collapsed_vars();
        assert_eq!(vars.get("hostname"), Some(&String::from("web1")));
        assert_eq!(vars.get("ip"), Some(&String::from("2001:DB8::1")));
    }

    #[test]
    fn collapsed_vars_overlay_order_is_base_tags_vars() {
        let mut host = Host::new();
        host.name = String::from("web1");
        host.tags = attrs(&[("env", "Prod"), ("hostname", "from-tags")]);
        host.vars = attrs(&[("env", "staging")]);

        let vars = host.collapsed_vars();
        assert_eq!(vars.get("env"), Some(&String::from("staging")));
        assert_eq!(vars.get("hostname"), Some(&String::from("from-tags")));
    }

    #[test]
    fn collapsed_vars_formats_modified_with_utc_offset() {
        let vars = Host::new().collapsed_vars();
        assert_eq!(vars.get("modified"),
                   Some(&String::from("1970-01-01T00:00:00+00:00")));
    }

    #[test]
    fn fresh_host_json_round_trips_with_empty_attr_maps() {
        let data = serde_json::to_string(&HostJson::new()).unwrap();
        let hj: HostJson = serde_json::from_str(&data).unwrap();

        assert_eq!(hj, HostJson::new());
        assert!(hj.tags.is_empty());
        assert!(hj.vars.is_empty());
    }

    #[test]
    fn constructors_never_leave_attr_maps_absent() {
        let host = Host::new();
        assert_eq!(host.tags, Hstore::new());
        assert_eq!(host.vars, Hstore::new());

        let hj = HostJson::new();
        assert_eq!(hj.tags, Map::new());
        assert_eq!(hj.vars, Map::new());
    }

    #[test]
    fn wire_snapshot_omits_defaults() {
        let mut hj = HostJson::new();
        hj.name = String::from("WEB1");
        hj.ip = String::from("10.0.0.5");
        hj.tags.insert(String::from("env"), Value::String(String::from("prod")));

        assert_eq!(serde_json::to_string(&hj).unwrap(),
                   r#"{"name":"WEB1","ip":"10.0.0.5","tags":{"env":"prod"}}"#);
    }

    #[test]
    fn decode_convert_and_snapshot_pipeline() {
        let body = r#"{"host": {"name": "WEB1", "ip": "10.0.0.5", "tags": {"Env": "Prod"}}}"#;
        let snapshot = host_json_from_body(body.as_bytes()).unwrap().to_host().to_json();

        assert_eq!(serde_json::to_string(&snapshot).unwrap(),
                   r#"{"name":"WEB1","ip":"10.0.0.5","tags":{"env":"prod"}}"#);
    }

    #[test]
    fn case_fold_collisions_keep_the_later_sorted_key() {
        let mut hj = HostJson::new();
        hj.tags.insert(String::from("Env"), Value::String(String::from("one")));
        hj.tags.insert(String::from("env"), Value::String(String::from("two")));

        // "Env" sorts before "env", so the lower-cased entry from "env" wins
        let host = hj.to_host();
        assert_eq!(host.tags.map.len(), 1);
        assert_eq!(host.tags.map.get("env").unwrap().string, "two");
    }
}

extern crate host;
extern crate serde_json;

use host::Error;

#[test]
fn decode_convert_and_encode_pipeline() {
    let body = r#"{"host": {"name": "WEB1", "ip": "10.0.0.5", "tags": {"Env": "Prod"}}}"#;

    let hj = host::host_json_from_body(body.as_bytes()).unwrap();
    let record = hj.to_host();
    assert_eq!(record.tags.map.get("env").unwrap().string, "prod");

    let snapshot = record.to_json();
    assert_eq!(serde_json::to_string(&snapshot).unwrap(),
               r#"{"name":"WEB1","ip":"10.0.0.5","tags":{"env":"prod"}}"#);
}

#[test]
fn envelope_is_mandatory() {
    let err = host::host_json_from_body(r#"{"name": "web1"}"#.as_bytes()).unwrap_err();
    assert_eq!(format!("{}", err), "no \"host\" in payload");

    match err {
        Error::InvalidPayload => (),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn collapsed_vars_feed_variable_resolution() {
    let body = r#"{"host": {"name": "Web1", "ip": "10.0.0.5",
                            "package": "nginx",
                            "tags": {"env": "prod"},
                            "vars": {"env": "staging"}}}"#;

    let record = host::host_json_from_body(body.as_bytes()).unwrap().to_host();
    let vars = record.collapsed_vars();

    assert_eq!(vars.get("hostname").unwrap(), "web1");
    assert_eq!(vars.get("ip").unwrap(), "10.0.0.5");
    assert_eq!(vars.get("package").unwrap(), "nginx");
    assert_eq!(vars.get("env").unwrap(), "staging");
}

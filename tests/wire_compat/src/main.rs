fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use wsprint_protocol::{OutboundResponse, ResponseAction, decode_request};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Responses ---

    #[test]
    fn fixture_print_success_response() {
        let resp: OutboundResponse = roundtrip_test("print_success_response.json");
        assert_eq!(resp, OutboundResponse::print_success());
    }

    #[test]
    fn fixture_error_response() {
        let resp: OutboundResponse = roundtrip_test("error_response.json");
        assert_eq!(resp.action, ResponseAction::Error);
        assert!(resp.file_name.is_none());
    }

    #[test]
    fn responses_always_carry_null_file_name() {
        for resp in [
            OutboundResponse::print_success(),
            OutboundResponse::error("x"),
        ] {
            let json = serde_json::to_value(&resp).unwrap();
            let object = json.as_object().unwrap();
            assert_eq!(object.len(), 3);
            assert!(object["FileName"].is_null());
        }
    }

    // --- Requests ---

    #[test]
    fn fixture_print_request() {
        let req = decode_request(&read_fixture("print_request.json")).unwrap();
        let print = req.validate().unwrap();
        assert_eq!(print.file_name, "label.png");
        assert_eq!(&print.image_bytes().unwrap()[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn fixture_print_request_with_extra_fields() {
        let plain = decode_request(&read_fixture("print_request.json")).unwrap();
        let browser = decode_request(&read_fixture("print_request_browser.json")).unwrap();

        // Key order and unknown keys do not matter.
        assert_eq!(browser.action, "print");
        assert_eq!(browser.image_data, plain.image_data);
        assert_eq!(browser.file_name.as_deref(), Some("receipt-0042.png"));
    }
}

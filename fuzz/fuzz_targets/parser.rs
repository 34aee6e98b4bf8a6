#![no_main]

use libfuzzer_sys::fuzz_target;

// Whatever parses must print to text that parses back to the same value.
fuzz_target!(|data: &[u8]| {
    for value in tabp::Parser::new(data).map_while(Result::ok) {
        let printed = value.to_string();
        let reparsed = tabp::parse(&printed).expect("printed value should parse");
        assert_eq!(reparsed.to_string(), printed);
    }
});

use encoding_rs::UTF_16BE;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

/// Parses a ToUnicode CMap stream into character code to text. Returns
/// `None` when the stream yields no usable mapping.
pub(crate) fn unicode_map(data: &[u8]) -> Option<HashMap<u32, String>> {
    // the parser indexes its token list directly and can panic on truncated input
    let parsed = match catch_unwind(AssertUnwindSafe(|| {
        adobe_cmap_parser::get_unicode_map(data)
    })) {
        Ok(Ok(parsed)) => parsed,
        Ok(Err(err)) => {
            warn!("failed to parse ToUnicode CMap: {:?}", err);
            return None;
        }
        Err(_) => {
            warn!("ToUnicode CMap parser gave up on malformed input");
            return None;
        }
    };

    let mut map = HashMap::with_capacity(parsed.len());
    for (code, bytes) in parsed {
        match utf16be_to_string(&bytes) {
            Some(text) => {
                map.insert(code, text);
            }
            None => debug!("skipping non UTF-16BE mapping for code {:#06x}", code),
        }
    }
    (!map.is_empty()).then_some(map)
}

/// Strict UTF-16BE decode; odd lengths and lone surrogates yield `None`.
pub(crate) fn utf16be_to_string(bytes: &[u8]) -> Option<String> {
    UTF_16BE
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

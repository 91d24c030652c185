#![no_main]

use heif_container::HeifContext;
use libfuzzer_sys::fuzz_target;

/// Interpreter fuzzer: classification and item data access must not
/// panic or run away on adversarial reference graphs.
fuzz_target!(|data: &[u8]| {
    let Ok(ctx) = HeifContext::from_bytes(data, &enough::Unstoppable) else {
        return;
    };
    let ids: Vec<u32> = ctx.images().keys().copied().collect();
    for id in ids {
        let _ = ctx.item_data(id);
        let _ = ctx.properties_for(id);
        let _ = ctx.transforms(id);
    }
    let _ = ctx.top_level_image_ids();
});

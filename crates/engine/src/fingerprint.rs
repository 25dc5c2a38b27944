use sessionguard_models::{Browser, DeviceDescriptor, Os, Platform, RequestContext};

/// Derive a compact device descriptor from request metadata.
///
/// Deterministic: identical headers and address always yield the same
/// fingerprint, across process restarts (crc32 has no per-process seed).
pub fn derive(ctx: &RequestContext) -> DeviceDescriptor {
    let canonical = [
        ctx.user_agent.as_str(),
        ctx.accept_language.as_str(),
        ctx.accept_encoding.as_str(),
        ctx.remote_address.as_str(),
    ]
    .join("|");

    DeviceDescriptor {
        fingerprint: format!("fp_{:08x}", crc32fast::hash(canonical.as_bytes())),
        platform: classify_platform(&ctx.user_agent),
        browser: classify_browser(&ctx.user_agent),
        os: classify_os(&ctx.user_agent),
    }
}

fn classify_platform(user_agent: &str) -> Platform {
    let ua = user_agent.to_lowercase();
    if ua.contains("ipad") || ua.contains("tablet") {
        Platform::Tablet
    } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
        Platform::Mobile
    } else {
        Platform::Desktop
    }
}

// First match wins; Edge before Chrome and Chrome before Safari because
// their user agents embed the later tokens.
fn classify_browser(user_agent: &str) -> Browser {
    let ua = user_agent.to_lowercase();
    if ua.contains("edg") {
        Browser::Edge
    } else if ua.contains("chrome") || ua.contains("crios") {
        Browser::Chrome
    } else if ua.contains("firefox") {
        Browser::Firefox
    } else if ua.contains("safari") {
        Browser::Safari
    } else {
        Browser::Unknown
    }
}

// Android before Linux (Android UAs contain "linux"), iOS before macOS
// (iPad UAs historically claim "like Mac OS X").
fn classify_os(user_agent: &str) -> Os {
    let ua = user_agent.to_lowercase();
    if ua.contains("windows") {
        Os::Windows
    } else if ua.contains("android") {
        Os::Android
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        Os::Ios
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        Os::MacOs
    } else if ua.contains("linux") {
        Os::Linux
    } else {
        Os::Unknown
    }
}

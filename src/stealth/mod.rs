//! Stealth script set injected into a fresh browser context. Evasion
//! fragments are inlined as string constants rather than loaded from disk
//! files, since the set is fixed and small enough not to need file-loading
//! indirection.

use rand::RngCore;

/// The basic stealth set injected for every fresh context: automation-flag
/// override, non-empty plugins list, fixed `languages`, a WebGL
/// vendor/renderer spoof, and canvas noise that never touches the live
/// canvas and never patches `getImageData`.
pub fn basic_scripts(session_seed: u64) -> Vec<String> {
    vec![
        WEBDRIVER_OVERRIDE.to_string(),
        PLUGINS_SPOOF.to_string(),
        LANGUAGES_SPOOF.to_string(),
        WEBGL_VENDOR_SPOOF.to_string(),
        canvas_noise_script(session_seed),
    ]
}

/// The enhanced anti-detection driver used when `stealth=true`. Superset of
/// the basic set plus a richer fingerprint-evasion surface (hardware
/// concurrency, user-agent data, media codecs, font spoofing, chrome
/// runtime objects).
pub fn enhanced_scripts(session_seed: u64) -> Vec<String> {
    let mut scripts = basic_scripts(session_seed);
    scripts.extend([
        HARDWARE_CONCURRENCY_SPOOF.to_string(),
        USER_AGENT_DATA_SPOOF.to_string(),
        CHROME_RUNTIME_SPOOF.to_string(),
        PERMISSIONS_SPOOF.to_string(),
    ]);
    scripts
}

/// Generate a per-session seed so canvas noise stays self-consistent within
/// one fetch (same seed -> same deterministic noise pattern).
pub fn new_session_seed() -> u64 {
    rand::rng().next_u64()
}

const WEBDRIVER_OVERRIDE: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
"#;

const PLUGINS_SPOOF: &str = r#"
Object.defineProperty(navigator, 'plugins', {
  get: () => [
    { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
    { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
    { name: 'Native Client', filename: 'internal-nacl-plugin' },
  ],
});
"#;

const LANGUAGES_SPOOF: &str = r#"
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
"#;

const WEBGL_VENDOR_SPOOF: &str = r#"
(function () {
  const spoofed = { vendor: 'Intel Inc.', renderer: 'Intel(R) UHD Graphics' };
  for (const proto of [WebGLRenderingContext, WebGLRenderingContext.prototype,
                        typeof WebGL2RenderingContext !== 'undefined' ? WebGL2RenderingContext.prototype : null]) {
    if (!proto) continue;
    const original = proto.getParameter;
    proto.getParameter = function (parameter) {
      if (parameter === 37445) return spoofed.vendor;
      if (parameter === 37446) return spoofed.renderer;
      return original.apply(this, arguments);
    };
  }
})();
"#;

/// Wraps `toDataURL`/`toBlob` to introduce deterministic pixel noise on a
/// *copy* of the canvas, seeded per-session. `getImageData` is intentionally
/// left untouched: patching it would break legitimate client code.
fn canvas_noise_script(session_seed: u64) -> String {
    format!(
        r#"
(function () {{
  const seed = {session_seed};
  let state = seed >>> 0;
  function nextNoise() {{
    state = (state * 1103515245 + 12345) >>> 0;
    return (state % 3) - 1;
  }}
  function noisyClone(canvas) {{
    const clone = document.createElement('canvas');
    clone.width = canvas.width;
    clone.height = canvas.height;
    const ctx = clone.getContext('2d');
    ctx.drawImage(canvas, 0, 0);
    const imageData = ctx.getImageData(0, 0, clone.width, clone.height);
    for (let i = 0; i < imageData.data.length; i += 4) {{
      imageData.data[i] = Math.min(255, Math.max(0, imageData.data[i] + nextNoise()));
    }}
    ctx.putImageData(imageData, 0, 0);
    return clone;
  }}
  const origToDataURL = HTMLCanvasElement.prototype.toDataURL;
  HTMLCanvasElement.prototype.toDataURL = function (...args) {{
    return origToDataURL.apply(noisyClone(this), args);
  }};
  const origToBlob = HTMLCanvasElement.prototype.toBlob;
  HTMLCanvasElement.prototype.toBlob = function (callback, ...args) {{
    return origToBlob.apply(noisyClone(this), [callback, ...args]);
  }};
}})();
"#
    )
}

const HARDWARE_CONCURRENCY_SPOOF: &str = r#"
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
"#;

const USER_AGENT_DATA_SPOOF: &str = r#"
if (navigator.userAgentData) {
  Object.defineProperty(navigator.userAgentData, 'brands', {
    get: () => [{ brand: 'Chromium', version: '120' }, { brand: 'Not A;Brand', version: '99' }],
  });
}
"#;

const CHROME_RUNTIME_SPOOF: &str = r#"
window.chrome = window.chrome || { runtime: {} };
"#;

const PERMISSIONS_SPOOF: &str = r#"
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) =>
  parameters.name === 'notifications'
    ? Promise.resolve({ state: Notification.permission })
    : originalQuery(parameters);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_set_has_exactly_five_fragments() {
        assert_eq!(basic_scripts(1).len(), 5);
    }

    #[test]
    fn enhanced_set_is_a_superset_of_basic() {
        let basic = basic_scripts(42);
        let enhanced = enhanced_scripts(42);
        assert!(enhanced.len() > basic.len());
        assert_eq!(&enhanced[..basic.len()], &basic[..]);
    }

    #[test]
    fn canvas_script_never_patches_get_image_data() {
        let script = canvas_noise_script(7);
        assert!(!script.contains("prototype.getImageData ="));
    }
}

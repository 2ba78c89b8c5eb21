use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=config-toast.json");

    if std::env::var("CARGO_CFG_TARGET_OS").unwrap() == "windows" {
        let mut res = winres::WindowsResource::new();
        res.set("FileDescription", "Toast Notifier");
        res.set("ProductName", "Toast Notifier");
        // Runs in the logged-on user's session, never elevated
        res.set_manifest(r#"
<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <trustInfo xmlns="urn:schemas-microsoft-com:asm.v3">
    <security>
      <requestedPrivileges>
        <requestedExecutionLevel level="asInvoker" uiAccess="false"/>
      </requestedPrivileges>
    </security>
  </trustInfo>
</assembly>
"#);
        res.compile().unwrap();
    }

    // Ship the sample configuration next to release binaries (default config location)
    let out_dir = std::env::var("OUT_DIR").unwrap_or_default();
    if out_dir.contains("release") {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        let src = Path::new(&manifest_dir).join("config-toast.json");
        let target_dir = Path::new(&manifest_dir).join("target").join("release");
        let dst = target_dir.join("config-toast.json");

        if src.exists() {
            let _ = fs::create_dir_all(&target_dir);
            let _ = fs::copy(&src, &dst);
        }
    }
}

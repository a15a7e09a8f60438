fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let git = std::process::Command::new("git")
        .args(["describe", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    // --version に出す文字列: "0.1.0 (abc1234)" またはパッケージ版のみ
    let version = match git {
        Some(rev) if !rev.is_empty() => format!("{} ({})", pkg_version, rev),
        _ => pkg_version,
    };
    println!("cargo:rustc-env=POSE3D_VERSION={}", version);
}

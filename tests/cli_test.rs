use clap::Parser;
use provider_git::cli::Args;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

fn make_args(args: &[&str]) -> Vec<OsString> {
    let mut res = vec![OsString::from("provider-git")];
    res.extend(args.iter().map(OsString::from));
    res
}

#[test]
fn test_basic_args() {
    let args = make_args(&["--manifests", "./manifests", "--provider-config", "./pc.yaml"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.manifests, PathBuf::from("./manifests"));
    assert_eq!(parsed.provider_config, PathBuf::from("./pc.yaml"));
    assert_eq!(parsed.sync, Duration::from_secs(3600));
    assert_eq!(parsed.max_reconcile_rate, 2);
    assert!(!parsed.debug);
    assert!(!parsed.once);
}

#[test]
fn test_all_flags() {
    let args = make_args(&[
        "--manifests",
        "m",
        "--provider-config",
        "pc.yaml",
        "--secrets-dir",
        "/run/secrets",
        "--configmaps-dir",
        "/run/configmaps",
        "--sync",
        "2h45m",
        "--max-reconcile-rate",
        "8",
        "--debug",
        "--once",
    ]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.secrets_dir, PathBuf::from("/run/secrets"));
    assert_eq!(parsed.configmaps_dir, PathBuf::from("/run/configmaps"));
    assert_eq!(parsed.sync, Duration::from_secs(2 * 3600 + 45 * 60));
    assert_eq!(parsed.max_reconcile_rate, 8);
    assert!(parsed.debug);
    assert!(parsed.once);
}

#[test]
fn test_short_flags() {
    let args = make_args(&["--manifests", "m", "--provider-config", "p", "-d", "-s", "300ms"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert!(parsed.debug);
    assert_eq!(parsed.sync, Duration::from_millis(300));
}

#[test]
fn test_invalid_values() {
    let args = make_args(&["--manifests", "m", "--provider-config", "p", "--sync", "soon"]);
    assert!(Args::try_parse_from(args).is_err());

    let args = make_args(&["--manifests", "m", "--provider-config", "p", "--max-reconcile-rate", "0"]);
    assert!(Args::try_parse_from(args).is_err());
}

#[test]
fn test_missing_args() {
    let args = make_args(&["--manifests", "m"]);
    assert!(Args::try_parse_from(args).is_err());
}

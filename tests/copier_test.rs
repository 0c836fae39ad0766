use provider_git::copier::CopyJob;
use provider_git::error::Error;
use provider_git::fs::{Filesystem, OsFs};
use provider_git::ignore::IgnoreSet;
use provider_git::renderer::{MustacheRenderer, RenderContext};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use test_log::test;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_verbatim_copy_is_isomorphic() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    write(source.path(), "skeleton/README.md", "# {{ name }}\n");
    write(source.path(), "skeleton/chart/values.yaml", "replicas: 1\n");
    write(source.path(), "skeleton/chart/templates/deployment.yaml", "kind: Deployment\n");
    fs::create_dir_all(source.path().join("skeleton/empty")).unwrap();

    let from = OsFs::new(source.path());
    let to = OsFs::new(target.path());
    CopyJob::new(&from, &to).copy_dir("skeleton", "/").unwrap();

    assert!(!dir_diff::is_different(source.path().join("skeleton"), target.path()).unwrap());
}

#[test]
fn test_copy_merges_into_existing_destination() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    write(source.path(), "skeleton/app/main.py", "print('{{ greeting }}')\n");
    write(target.path(), "README.md", "kept\n");
    write(target.path(), "app/main.py", "stale\n");

    let from = OsFs::new(source.path());
    let to = OsFs::new(target.path());
    let renderer = MustacheRenderer::new();
    let context = RenderContext::parse("greeting: hello").unwrap();
    CopyJob::new(&from, &to)
        .with_rendering(&renderer, &context)
        .copy_dir("/skeleton", "/")
        .unwrap();

    assert_eq!(fs::read_to_string(target.path().join("README.md")).unwrap(), "kept\n");
    assert_eq!(
        fs::read_to_string(target.path().join("app/main.py")).unwrap(),
        "print('hello')\n"
    );
}

#[test]
fn test_ignore_file_keeps_templates_raw() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    write(source.path(), ".krateoignore", "# shipped as-is\n*.tpl\n");
    write(source.path(), "skeleton/helm/templates/_helpers.tpl", "{{ .Values.name }}\n");
    write(source.path(), "skeleton/catalog-info.yaml", "name: {{ name }}\n");

    let from = OsFs::new(source.path());
    let to = OsFs::new(target.path());
    let ignore = IgnoreSet::load(&from);
    assert!(!ignore.is_disabled());

    let renderer = MustacheRenderer::new();
    let context = RenderContext::parse(r#"{"name": "fireworks"}"#).unwrap();
    CopyJob::new(&from, &to)
        .with_rendering(&renderer, &context)
        .with_ignore(ignore)
        .copy_dir("skeleton", "deploy")
        .unwrap();

    assert_eq!(
        fs::read_to_string(target.path().join("deploy/helm/templates/_helpers.tpl")).unwrap(),
        "{{ .Values.name }}\n"
    );
    assert_eq!(
        fs::read_to_string(target.path().join("deploy/catalog-info.yaml")).unwrap(),
        "name: fireworks\n"
    );
}

#[test]
fn test_missing_source() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    write(source.path(), "file.txt", "not a dir");

    let from = OsFs::new(source.path());
    let to = OsFs::new(target.path());

    let err = CopyJob::new(&from, &to).copy_dir("skeleton", "/").unwrap_err();
    assert!(matches!(err, Error::SourceMissing { .. }));

    let err = CopyJob::new(&from, &to).copy_dir("file.txt", "/").unwrap_err();
    assert!(matches!(err, Error::NotADirectory { .. }));
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_skipped() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    write(source.path(), "skeleton/real.txt", "real\n");
    std::os::unix::fs::symlink("real.txt", source.path().join("skeleton/link.txt")).unwrap();

    let from = OsFs::new(source.path());
    let to = OsFs::new(target.path());
    CopyJob::new(&from, &to).copy_dir("skeleton", "/").unwrap();

    assert!(to.exists("real.txt").unwrap());
    assert!(fs::symlink_metadata(target.path().join("link.txt")).is_err());
}

#[cfg(unix)]
#[test]
fn test_directory_mode_survives_copy() {
    use std::os::unix::fs::PermissionsExt;

    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    write(source.path(), "skeleton/run.sh", "#!/bin/sh\n");
    fs::set_permissions(
        source.path().join("skeleton"),
        fs::Permissions::from_mode(0o750),
    )
    .unwrap();

    let from = OsFs::new(source.path());
    let to = OsFs::new(target.path());
    CopyJob::new(&from, &to).copy_dir("skeleton", "out").unwrap();

    let mode = fs::metadata(target.path().join("out")).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o750);
}

#[cfg(unix)]
#[test]
fn test_symlinked_destination_directory_is_not_followed() {
    use provider_git::fs::MemFs;

    let target = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    write(target.path(), "README.md", "kept\n");
    std::os::unix::fs::symlink(outside.path(), target.path().join("docs")).unwrap();

    let from = MemFs::new();
    from.write("/skel/docs/pwned.txt", b"pwned\n").unwrap();
    let to = OsFs::new(target.path());

    let err = CopyJob::new(&from, &to).copy_dir("/skel", "/").unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err}");
    assert!(!outside.path().join("pwned.txt").exists());
    assert_eq!(fs::read_dir(outside.path()).unwrap().count(), 0);
}

mod chapter_stub;

use chapter_stub::{ChapterStub, chapter_page};
use predicates::prelude::*;

fn spawn_site() -> ChapterStub {
    ChapterStub::spawn(|path, _hit| match path {
        "/x/chapter-1" => (200, chapter_page("<p>A. B. C. D.</p>")),
        "/x/chapter-2.html" => (200, chapter_page("<p>Only one sentence here.</p>")),
        _ => (500, "upstream down".to_owned()),
    })
}

#[test]
fn fetch_prints_numbered_segments() {
    let site = spawn_site();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args([
        "fetch",
        "--url",
        &format!("{}/x/chapter-{{n}}", site.base_url),
        "--tag",
        "div",
        "--id",
        "article",
        "--clump-size",
        "2",
        "--fetch-delay-ms",
        "0",
    ])
    .assert()
    .success()
    .stdout("[1/2]\nA. B.\n\n[2/2]\nC. D.\n\n");
}

#[test]
fn fetch_appends_html_suffix() {
    let site = spawn_site();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args([
        "fetch",
        "--url",
        &format!("{}/x/chapter-", site.base_url),
        "--chapter-format",
        "html",
        "--chapter",
        "2",
        "--id",
        "article",
        "--fetch-delay-ms",
        "0",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Only one sentence here."));

    assert_eq!(site.requests(), vec!["/x/chapter-2.html"]);
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let site = spawn_site();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.env("RUST_LOG", "debug")
        .args([
            "fetch",
            "--url",
            &format!("{}/x/chapter-{{n}}", site.base_url),
            "--fetch-delay-ms",
            "0",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}

#[test]
fn exhausted_fetch_fails_with_context() {
    let site = spawn_site();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args([
        "fetch",
        "--url",
        &format!("{}/x/chapter-{{n}}", site.base_url),
        "--chapter",
        "9",
        "--fetch-attempts",
        "2",
        "--fetch-delay-ms",
        "0",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("gave up after 2 attempt(s)"));

    assert_eq!(site.requests(), vec!["/x/chapter-9", "/x/chapter-9"]);
}

#[test]
fn source_and_url_conflict() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args([
        "fetch",
        "--source",
        "novel.yaml",
        "--url",
        "http://127.0.0.1:9/x/",
    ])
    .assert()
    .failure();
}

#[test]
fn fetch_reads_source_file() -> anyhow::Result<()> {
    let site = spawn_site();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("novel.yaml");
    std::fs::write(
        &path,
        format!(
            "url: \"{}/x/chapter-{{n}}\"\nextract:\n  tag: div\n  id: article\n",
            site.base_url
        ),
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args(["fetch", "--clump-size", "4", "--source"])
        .arg(&path)
        .assert()
        .success()
        .stdout("[1/1]\nA. B. C. D.\n\n");
    Ok(())
}

#[test]
fn fetch_reads_saved_chapter_directory() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("Novel - Chapter 2.html"),
        chapter_page("<p>Second, from disk.</p>"),
    )?;
    std::fs::write(
        dir.path().join("Novel - Chapter 1.html"),
        chapter_page("<p>First, from disk.</p>"),
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args(["fetch", "--id", "article", "--chapter", "2", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout("[1/1]\nSecond, from disk.\n\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelcast");
    cmd.args(["fetch", "--chapter", "5", "--dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("chapter 5 is not in the source"));
    Ok(())
}

//! Robots policy and sitemap discovery against a mock HTTP server, using
//! `mockito` for network-facing tests.

use mockito::Server;
use webcrawl_core::robots;
use webcrawl_core::sitemap;

#[tokio::test]
async fn fetch_parses_disallow_rules_and_sitemap_directive() {
    let mut server = Server::new_async().await;
    let robots_txt = "User-agent: *\nDisallow: /private\nSitemap: /sitemap.xml\n";
    let mock = server.mock("GET", "/robots.txt").with_status(200).with_body(robots_txt).create_async().await;

    let client = reqwest::Client::new();
    let policy = robots::fetch(&client, &server.url(), "*").await.expect("fetch");

    mock.assert_async().await;
    assert!(!robots::allowed(&format!("{}/private/page", server.url()), &policy));
    assert!(robots::allowed(&format!("{}/public/page", server.url()), &policy));
    assert_eq!(policy.sitemaps, vec![format!("{}/sitemap.xml", server.url())]);
}

#[tokio::test]
async fn missing_robots_txt_is_fully_permissive() {
    let mut server = Server::new_async().await;
    let mock = server.mock("GET", "/robots.txt").with_status(404).create_async().await;

    let client = reqwest::Client::new();
    let policy = robots::fetch(&client, &server.url(), "*").await.expect("fetch");

    mock.assert_async().await;
    assert!(robots::allowed(&format!("{}/anything", server.url()), &policy));
}

#[tokio::test]
async fn discover_falls_back_to_common_sitemap_paths() {
    let mut server = Server::new_async().await;
    let mock = server.mock("GET", "/sitemap.xml").with_status(200).with_body("<urlset></urlset>").create_async().await;

    let client = reqwest::Client::new();
    let found = sitemap::discover(&client, &server.url(), &[]).await;

    mock.assert_async().await;
    assert_eq!(found, vec![format!("{}/sitemap.xml", server.url())]);
}

#[tokio::test]
async fn parse_extracts_loc_and_lastmod_entries() {
    let mut server = Server::new_async().await;
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://a.test/one</loc><lastmod>2026-01-01</lastmod></url>
  <url><loc>https://a.test/two</loc></url>
</urlset>"#;
    let mock = server.mock("GET", "/sitemap.xml").with_status(200).with_body(body).create_async().await;

    let client = reqwest::Client::new();
    let sitemap_url = format!("{}/sitemap.xml", server.url());
    let entries = sitemap::parse(&client, &sitemap_url, 50_000, 5).await;

    mock.assert_async().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].loc, "https://a.test/one");
    assert!(entries[0].lastmod.is_some());
    assert_eq!(entries[1].loc, "https://a.test/two");
    assert!(entries[1].lastmod.is_none());
}

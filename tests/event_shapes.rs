//! External event-stream shapes: the tagged JSON vocabulary map/crawl
//! streams to callers must serialize exactly as named, independent of how
//! the events are produced internally.

use webcrawl_core::events::{CrawlEvent, MapEvent};
use webcrawl_core::map::MapResult;
use webcrawl_core::ScrapeData;

#[test]
fn map_event_tags_match_external_vocabulary() {
    let sitemap = MapEvent::Sitemap { found: 2, message: "found 2 sitemap(s)".to_string() };
    let discovery = MapEvent::Discovery { url: "https://a.test/one".to_string(), discovered: 1, total: 10 };
    let metadata = MapEvent::Metadata { url: "https://a.test/one".to_string(), completed: 1, total: 10 };
    let complete =
        MapEvent::Complete { result: MapResult { success: true, links: vec![], error: None } };
    let error = MapEvent::Error { message: "boom".to_string() };

    assert_eq!(json_tag(&sitemap), "sitemap");
    assert_eq!(json_tag(&discovery), "discovery");
    assert_eq!(json_tag(&metadata), "metadata");
    assert_eq!(json_tag(&complete), "complete");
    assert_eq!(json_tag(&error), "error");
}

#[test]
fn crawl_event_tags_match_external_vocabulary() {
    let mapping = CrawlEvent::Mapping { event: MapEvent::Sitemap { found: 0, message: "none".to_string() } };
    let progress = CrawlEvent::Progress { completed: 1, total: 5 };
    let data = ScrapeData { url: "https://a.test".to_string(), status_code: 200, ..Default::default() };
    let page = CrawlEvent::Page { url: "https://a.test".to_string(), data: Box::new(data), completed: 1, total: 5 };
    let error = CrawlEvent::Error { url: Some("https://a.test".to_string()), error: "boom".to_string(), completed: Some(1), total: Some(5) };
    let complete = CrawlEvent::Complete { completed: 5, total: 5 };

    assert_eq!(json_tag(&mapping), "mapping");
    assert_eq!(json_tag(&progress), "progress");
    assert_eq!(json_tag(&page), "page");
    assert_eq!(json_tag(&error), "error");
    assert_eq!(json_tag(&complete), "complete");
}

#[test]
fn crawl_page_event_carries_scrape_data() {
    let mut data = ScrapeData { url: "https://a.test".to_string(), status_code: 200, ..Default::default() };
    data.markdown = Some("# hi".to_string());
    let event = CrawlEvent::Page { url: "https://a.test".to_string(), data: Box::new(data), completed: 1, total: 1 };

    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["data"]["markdown"], "# hi");
}

fn json_tag<T: serde::Serialize>(event: &T) -> String {
    let value = serde_json::to_value(event).expect("serialize");
    value["type"].as_str().expect("type tag present").to_string()
}

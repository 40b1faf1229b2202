// tests/search_pipeline.rs
//
// End-to-end pipeline tests against the engine itself (no HTTP layer):
// fixture feeds in both wire formats, encoding declarations, intent-driven
// matching and ranking order.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;

use vinbot_search::aggregate::{ResponseSource, SearchEngine};
use vinbot_search::config::{FeedSource, SearchConfig};
use vinbot_search::fetch::{FeedFetch, FeedPayload};
use vinbot_search::merchants::MerchantDirectory;

struct FixtureFetcher {
    payloads: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl FeedFetch for FixtureFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<FeedPayload> {
        match self.payloads.get(url) {
            Some(bytes) => Ok(FeedPayload {
                bytes: bytes.clone(),
                charset: None,
            }),
            None => bail!("fixture: unreachable host"),
        }
    }
}

fn engine(payloads: Vec<(&str, &str, Vec<u8>)>) -> SearchEngine {
    let mut cfg = SearchConfig::builtin();
    cfg.feeds = payloads
        .iter()
        .map(|(merchant, url, _)| FeedSource {
            merchant: merchant.to_string(),
            url: url.to_string(),
        })
        .collect();
    cfg.search.enrich_limit = 0;

    let fetcher = FixtureFetcher {
        payloads: payloads
            .into_iter()
            .map(|(_, url, bytes)| (url.to_string(), bytes))
            .collect(),
    };
    SearchEngine::new(cfg, Arc::new(fetcher), MerchantDirectory::default_seed()).unwrap()
}

const XML_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?><products>
    <product>
        <name>Cabernet Sauvignon Reserva</name>
        <deeplink>https://xml.example/cab</deeplink>
        <price>120,00</price>
        <imageurl>https://img.example/cab.jpg</imageurl>
        <categoryname>Rødvin</categoryname>
    </product>
    <product>
        <name>Cabernet Gran Reserva</name>
        <deeplink>https://xml.example/gran</deeplink>
        <price>180,00</price>
        <categoryname>Rødvin</categoryname>
    </product>
    <product>
        <name>Vinglas Bordeaux, 2 stk</name>
        <deeplink>https://xml.example/glas</deeplink>
        <price>79,00</price>
    </product>
</products>"#;

const CSV_FEED: &str = "produktnavn;deeplink;pris;beskrivelse\n\
Malbec Mendoza;https://csv.example/malbec;139,00;Argentinsk rødvin til grillmad\n\
Hvidvin Chardonnay;https://csv.example/chard;99,00;Fadlagret hvidvin\n";

#[tokio::test]
async fn intent_query_matches_across_both_wire_formats() {
    let eng = engine(vec![
        ("XML Shop", "https://xml.example/feed", XML_FEED.as_bytes().to_vec()),
        ("CSV Shop", "https://csv.example/feed", CSV_FEED.as_bytes().to_vec()),
    ]);

    // "bøf under 150 kr" expands to cabernet/malbec/syrah terms with max 150.
    let out = eng.search("bøf under 150 kr", None).await;
    assert_eq!(out.source, ResponseSource::Feed);

    let urls: Vec<&str> = out
        .products
        .iter()
        .map(|p| p["url"].as_str().unwrap())
        .collect();
    assert!(urls.contains(&"https://xml.example/cab"), "cabernet at 120 matches");
    assert!(urls.contains(&"https://csv.example/malbec"), "malbec at 139 matches");
    assert!(!urls.contains(&"https://xml.example/gran"), "180 exceeds the max");
    assert!(!urls.contains(&"https://xml.example/glas"), "glassware filtered");

    // The imaged cabernet outranks the imageless malbec on the flat bonus.
    assert_eq!(urls[0], "https://xml.example/cab");
}

#[tokio::test]
async fn latin1_declared_payload_is_decoded_before_extraction() {
    // "Rødvin Côtes" with ø=0xF8 and ô=0xF4, declared as ISO-8859-1.
    let mut bytes =
        b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><products><product><name>R".to_vec();
    bytes.push(0xF8);
    bytes.extend_from_slice(b"dvin C");
    bytes.push(0xF4);
    bytes.extend_from_slice(
        b"tes</name><deeplink>https://l1.example/p</deeplink><price>89,00</price></product></products>",
    );

    let eng = engine(vec![("Latin Shop", "https://l1.example/feed", bytes)]);
    let out = eng.search("rødvin", None).await;
    assert_eq!(out.source, ResponseSource::Feed);
    assert_eq!(out.products[0]["title"], "Rødvin Côtes");
}

#[tokio::test]
async fn result_cap_bounds_the_response() {
    let mut xml = String::from("<products>");
    for i in 0..60 {
        xml.push_str(&format!(
            "<product><name>Rioja nr {i}</name><deeplink>https://big.example/{i}</deeplink><price>{},00</price></product>",
            100 + i
        ));
    }
    xml.push_str("</products>");

    let eng = engine(vec![("Big Shop", "https://big.example/feed", xml.into_bytes())]);
    let out = eng.search("rioja", None).await;
    assert_eq!(out.source, ResponseSource::Feed);
    assert_eq!(out.products.len(), 36);
    // Ascending price on equal scores: the cheapest survives the cut first.
    assert_eq!(out.products[0]["price"].as_f64().unwrap(), 100.0);
}

#[tokio::test]
async fn every_source_failing_yields_fallback_not_an_error() {
    let mut cfg = SearchConfig::builtin();
    cfg.feeds = vec![
        FeedSource {
            merchant: "Dead A".into(),
            url: "https://gone-a.example/feed".into(),
        },
        FeedSource {
            merchant: "Dead B".into(),
            url: "https://gone-b.example/feed".into(),
        },
    ];
    cfg.search.enrich_limit = 0;
    let eng = SearchEngine::new(
        cfg,
        Arc::new(FixtureFetcher {
            payloads: HashMap::new(),
        }),
        MerchantDirectory::default_seed(),
    )
    .unwrap();

    let out = eng.search("barolo", None).await;
    assert_eq!(out.source, ResponseSource::Fallback);
    assert_eq!(out.meta.as_ref().unwrap().feeds_failed, 2);
    assert!(!out.products.is_empty());
}

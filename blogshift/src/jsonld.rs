use scraper::{Html, Selector};
use serde_json::Value;

/// Every JSON-LD object in the document, flattening top-level arrays and `@graph` lists.
fn objects(document: &Html) -> Vec<Value> {
    let mut out = Vec::new();
    if let Ok(script_selector) = Selector::parse("script[type='application/ld+json']") {
        for script in document.select(&script_selector) {
            if let Ok(json) = serde_json::from_str::<Value>(script.text().collect::<String>().trim()) {
                flatten(json, &mut out);
            }
        }
    }
    out
}

fn flatten(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten(v, out)),
        Value::Object(mut obj) => {
            if let Some(graph) = obj.remove("@graph") {
                flatten(graph, out);
            }
            out.push(Value::Object(obj));
        }
        _ => {}
    }
}

/// Author names from JSON-LD metadata (string, object, or array of objects).
pub fn extract_authors(document: &Html) -> Vec<String> {
    let mut authors = Vec::new();

    for json in objects(document) {
        if let Some(author) = json.get("author") {
            match author {
                Value::Array(arr) => {
                    for author_obj in arr {
                        if let Some(name) = author_obj.get("name").and_then(|n| n.as_str()) {
                            authors.push(name.trim().to_string());
                        } else if let Some(name) = author_obj.as_str() {
                            authors.push(name.trim().to_string());
                        }
                    }
                }
                Value::Object(obj) => {
                    if let Some(name) = obj.get("name").and_then(|n| n.as_str()) {
                        authors.push(name.trim().to_string());
                    }
                }
                Value::String(s) => {
                    authors.push(s.trim().to_string());
                }
                _ => {}
            }
        }
    }

    authors.retain(|a| !a.is_empty());
    authors.dedup();
    authors
}

/// The first `datePublished` value found, as raw text.
pub fn extract_date_published(document: &Html) -> Option<String> {
    objects(document).into_iter().find_map(|json| {
        json.get("datePublished")
            .and_then(|d| d.as_str())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_graph_authors_and_date() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
                {"@type":"WebPage","name":"x"},
                {"@type":"BlogPosting","author":{"@type":"Person","name":" Ritika Sankhla "},
                 "datePublished":"2023-12-01T09:00:00+00:00"}
            ]}
        </script></head><body></body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(extract_authors(&doc), vec!["Ritika Sankhla".to_string()]);
        assert_eq!(
            extract_date_published(&doc).as_deref(),
            Some("2023-12-01T09:00:00+00:00")
        );
    }

    #[test]
    fn author_arrays_and_strings() {
        let html = r#"<script type="application/ld+json">
            [{"author":[{"name":"A"},{"name":"B"}]},{"author":"C"}]
        </script>"#;
        let doc = Html::parse_document(html);
        assert_eq!(extract_authors(&doc), vec!["A", "B", "C"]);
    }

    #[test]
    fn broken_json_is_ignored() {
        let doc = Html::parse_document(r#"<script type="application/ld+json">{nope</script>"#);
        assert!(extract_authors(&doc).is_empty());
        assert!(extract_date_published(&doc).is_none());
    }
}

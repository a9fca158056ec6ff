//! Slug, title and hashtag normalization.
//!
//! Everything here is pure: no clock, no network. Hashtag extraction and
//! stripping share one token definition ([`HASHTAG`]): `#` followed by word
//! characters, where the `#` is not preceded by a word character. `abc#def`
//! and a lone `#` are left alone by both operations.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::TagSource;
use crate::contract::MediaItem;

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\B#(\w+)").expect("hashtag pattern compiles"));

static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space pattern compiles"));

/// Last non-empty path segment of a permalink, ignoring query and fragment.
///
/// `https://www.instagram.com/p/BYeY7yClLbk/` => `BYeY7yClLbk`.
pub fn short_code(permalink: &str) -> String {
    let path = match reqwest::Url::parse(permalink) {
        Ok(url) => url.path().to_string(),
        Err(_) => permalink
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// All hashtags in `text`, without the `#`, in order of appearance.
pub fn extract_tags(text: &str) -> Vec<String> {
    HASHTAG
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// `text` with every hashtag token removed. Space runs left behind are
/// collapsed and each line is right-trimmed; line structure is kept.
pub fn strip_hashtags(text: &str) -> String {
    let removed = HASHTAG.replace_all(text, "");
    removed
        .lines()
        .map(|line| SPACE_RUN.replace_all(line, " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Whether `tag` is a single hashtag word, safe to emit into front matter.
pub fn is_plain_tag(tag: &str) -> bool {
    let tags = extract_tags(&format!("#{tag}"));
    tags.len() == 1 && tags[0] == tag
}

/// Human title for a post.
///
/// The caption verbatim when it has at most `max_words` words, otherwise its
/// first `max_words` words followed by `…`. An empty caption falls back to
/// `"<source_label> - <short_code>"`.
pub fn title(caption: Option<&str>, short_code: &str, source_label: &str, max_words: usize) -> String {
    let caption = caption.unwrap_or_default();
    let words: Vec<&str> = caption.split_whitespace().collect();
    if words.is_empty() {
        return format!("{source_label} - {short_code}");
    }
    if words.len() > max_words {
        format!("{}…", words[..max_words].join(" "))
    } else {
        caption.to_string()
    }
}

/// The tag set for an item under the configured tag source, de-duplicated,
/// first occurrence wins.
pub fn item_tags(item: &MediaItem, source: TagSource) -> Vec<String> {
    let from_caption = || extract_tags(item.caption.as_deref().unwrap_or_default());
    let tags = match source {
        TagSource::Caption => from_caption(),
        TagSource::Field => item.tags.clone(),
        TagSource::Both => {
            let mut all = from_caption();
            all.extend(item.tags.iter().cloned());
            all
        }
    };
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        if !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn item(caption: &str, tags: &[&str]) -> MediaItem {
        MediaItem {
            short_code: "FOOOBAAR".into(),
            caption: Some(caption.into()),
            media_url: "https://scontent.cdninstagram.com/pretend_url.jpg".into(),
            timestamp: DateTime::parse_from_rfc3339("2017-08-31T22:24:48+00:00").unwrap(),
            permalink: "https://www.instagram.com/p/FOOOBAAR/".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn short_code_is_last_path_segment() {
        assert_eq!(short_code("https://www.instagram.com/p/BYeY7yClLbk/"), "BYeY7yClLbk");
        assert_eq!(short_code("https://www.instagram.com/p/BYeY7yClLbk"), "BYeY7yClLbk");
        assert_eq!(
            short_code("https://www.instagram.com/p/BYeY7yClLbk/?utm_source=ig"),
            "BYeY7yClLbk"
        );
        assert_eq!(short_code("p/CdEf12/"), "CdEf12");
    }

    #[test]
    fn short_code_is_stable() {
        let link = "https://www.instagram.com/reel/Cx9_a-Z/";
        let first = short_code(link);
        for _ in 0..5 {
            assert_eq!(short_code(link), first);
        }
    }

    #[test]
    fn extracts_hashtags_in_order() {
        assert_eq!(
            extract_tags("Image text is here #anotag #tag1 #tag2"),
            vec!["anotag", "tag1", "tag2"]
        );
        assert_eq!(extract_tags("#start and#not and # lone"), vec!["start"]);
        assert!(extract_tags("").is_empty());
    }

    #[test]
    fn stripping_removes_exactly_the_extracted_tokens() {
        let captions = [
            "Image text is here #anotag #tag1 #tag2",
            "#run first\nsecond line #tech, issue#42 and C# stays",
            "no tags at all",
            "##double #x_y #ünïcode",
        ];
        for caption in captions {
            let stripped = strip_hashtags(caption);
            assert!(extract_tags(&stripped).is_empty(), "tags leaked: {stripped:?}");
            for tag in extract_tags(caption) {
                assert!(caption.contains(&format!("#{tag}")));
            }
        }
        let body = strip_hashtags("#run first\nsecond line #tech, issue#42 and C# stays");
        assert_eq!(body, "first\nsecond line , issue#42 and C# stays");
    }

    #[test]
    fn strips_sample_caption() {
        let body = strip_hashtags("Image text is here #anotag #tag1 #tag2");
        assert_eq!(body, "Image text is here");
    }

    #[test]
    fn titles() {
        assert_eq!(title(Some(""), "FOOOBAAR", "Instagram", 8), "Instagram - FOOOBAAR");
        assert_eq!(title(None, "FOOOBAAR", "Instagram", 8), "Instagram - FOOOBAAR");
        assert_eq!(
            title(Some("Image text is here"), "FOOOBAAR", "Instagram", 8),
            "Image text is here"
        );
        assert_eq!(
            title(
                Some("Image text is here and is very very very very long"),
                "FOOOBAAR",
                "Instagram",
                8
            ),
            "Image text is here and is very very…"
        );
    }

    #[test]
    fn plain_tags() {
        assert!(is_plain_tag("tag1"));
        assert!(!is_plain_tag("two words"));
        assert!(!is_plain_tag("x\": injected"));
        assert!(!is_plain_tag(""));
    }

    #[test]
    fn item_tags_follow_the_configured_source() {
        let it = item("Image text is here #anotag #tag1 #tag2", &["tag1", "tag2", "run"]);
        assert_eq!(item_tags(&it, TagSource::Caption), vec!["anotag", "tag1", "tag2"]);
        assert_eq!(item_tags(&it, TagSource::Field), vec!["tag1", "tag2", "run"]);
        assert_eq!(
            item_tags(&it, TagSource::Both),
            vec!["anotag", "tag1", "tag2", "run"]
        );
    }
}

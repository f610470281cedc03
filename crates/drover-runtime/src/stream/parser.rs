//! Incremental `<tool_call>` tag parser.
//!
//! Model output interleaves plain prose with tool-call blocks of the form
//! `<tool_call>{"name": "...", "input": {...}}</tool_call>`. Chunk
//! boundaries are arbitrary: a tag, or the JSON between tags, can be split
//! across any number of chunks. The parser holds back only as many bytes as
//! could still turn out to be a tag, so prose reaches subscribers with
//! minimal latency.

use drover_core::tools::RawToolCall;
use serde::Deserialize;
use serde_json::Value;

const OPEN_TAG: &str = "<tool_call>";
const CLOSE_TAG: &str = "</tool_call>";

/// One parsed unit of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Plain response text outside any tag.
    Text(String),
    /// A complete, well-formed tool call.
    Call(RawToolCall),
    /// A complete tag whose body was not a valid call.
    Malformed {
        /// What was wrong with the body.
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParseState {
    Outside,
    Inside,
}

/// Wire shape of a tool-call body.
#[derive(Deserialize)]
struct CallBody {
    name: String,
    #[serde(default)]
    input: Value,
}

/// Streaming parser; feed chunks with [`push`](Self::push), then flush with
/// [`finish`](Self::finish) at end of stream.
#[derive(Debug)]
pub struct TagParser {
    state: ParseState,
    buffer: String,
}

impl TagParser {
    /// Fresh parser, outside any tag.
    pub fn new() -> Self {
        Self {
            state: ParseState::Outside,
            buffer: String::new(),
        }
    }

    /// Consume one chunk and return every item it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamItem> {
        self.buffer.push_str(chunk);
        let mut items = Vec::new();
        loop {
            match self.state {
                ParseState::Outside => {
                    if let Some(at) = self.buffer.find(OPEN_TAG) {
                        if at > 0 {
                            items.push(StreamItem::Text(self.buffer[..at].to_owned()));
                        }
                        self.buffer.drain(..at + OPEN_TAG.len());
                        self.state = ParseState::Inside;
                    } else {
                        // Release everything except a suffix that could still
                        // grow into an open tag.
                        let hold = partial_tag_len(&self.buffer);
                        let release = self.buffer.len() - hold;
                        if release > 0 {
                            let text: String = self.buffer.drain(..release).collect();
                            items.push(StreamItem::Text(text));
                        }
                        break;
                    }
                }
                ParseState::Inside => {
                    if let Some(at) = self.buffer.find(CLOSE_TAG) {
                        let body: String = self.buffer.drain(..at).collect();
                        self.buffer.drain(..CLOSE_TAG.len());
                        self.state = ParseState::Outside;
                        items.push(parse_body(&body));
                    } else {
                        break;
                    }
                }
            }
        }
        items
    }

    /// Flush at end of stream. An unterminated tag is not dropped; it comes
    /// back as the literal text the model produced.
    pub fn finish(&mut self) -> Vec<StreamItem> {
        let mut items = Vec::new();
        match self.state {
            ParseState::Outside => {
                if !self.buffer.is_empty() {
                    items.push(StreamItem::Text(std::mem::take(&mut self.buffer)));
                }
            }
            ParseState::Inside => {
                let mut text = String::from(OPEN_TAG);
                text.push_str(&self.buffer);
                self.buffer.clear();
                self.state = ParseState::Outside;
                items.push(StreamItem::Text(text));
            }
        }
        items
    }
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest buffer suffix that is a proper prefix of the open
/// tag.
fn partial_tag_len(buffer: &str) -> usize {
    let max = OPEN_TAG.len().min(buffer.len());
    (1..=max)
        .rev()
        .find(|&len| buffer.ends_with(&OPEN_TAG[..len]))
        .unwrap_or(0)
}

fn parse_body(body: &str) -> StreamItem {
    match serde_json::from_str::<CallBody>(body) {
        Ok(parsed) if parsed.input.is_object() || parsed.input.is_null() => {
            let input = if parsed.input.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                parsed.input
            };
            StreamItem::Call(RawToolCall::new(parsed.name, input))
        }
        Ok(_) => StreamItem::Malformed {
            message: "tool call input must be a JSON object".into(),
        },
        Err(error) => StreamItem::Malformed {
            message: format!("malformed tool call body: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn collect(chunks: &[&str]) -> Vec<StreamItem> {
        let mut parser = TagParser::new();
        let mut items = Vec::new();
        for chunk in chunks {
            items.extend(parser.push(chunk));
        }
        items.extend(parser.finish());
        items
    }

    fn joined_text(items: &[StreamItem]) -> String {
        items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let items = collect(&["hello ", "world"]);
        assert_eq!(joined_text(&items), "hello world");
        assert!(items.iter().all(|item| matches!(item, StreamItem::Text(_))));
    }

    #[test]
    fn single_call_in_one_chunk() {
        let items = collect(&[r#"<tool_call>{"name": "end_turn", "input": {}}</tool_call>"#]);
        assert_eq!(items.len(), 1);
        assert_matches!(&items[0], StreamItem::Call(call) if call.tool_name == "end_turn");
    }

    #[test]
    fn call_split_across_many_chunks() {
        let items = collect(&[
            "before <to",
            "ol_call>{\"name\": \"write_file\", ",
            "\"input\": {\"path\": \"a.rs\", \"content\": \"fn\"}}</tool_c",
            "all> after",
        ]);
        assert_eq!(joined_text(&items), "before  after");
        let call = items
            .iter()
            .find_map(|item| match item {
                StreamItem::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.tool_name, "write_file");
        assert_eq!(call.input, json!({"path": "a.rs", "content": "fn"}));
    }

    #[test]
    fn multiple_calls_keep_arrival_order() {
        let items = collect(&[concat!(
            r#"<tool_call>{"name": "a", "input": {}}</tool_call>"#,
            r#"<tool_call>{"name": "b", "input": {}}</tool_call>"#,
        )]);
        let names: Vec<&str> = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Call(call) => Some(call.tool_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn bad_json_is_malformed_not_lost() {
        let items = collect(&["<tool_call>not json at all</tool_call>"]);
        assert_eq!(items.len(), 1);
        assert_matches!(&items[0], StreamItem::Malformed { message } if message.contains("malformed"));
    }

    #[test]
    fn non_object_input_is_malformed() {
        let items = collect(&[r#"<tool_call>{"name": "x", "input": 7}</tool_call>"#]);
        assert_matches!(&items[0], StreamItem::Malformed { .. });
    }

    #[test]
    fn missing_input_defaults_to_empty_object() {
        let items = collect(&[r#"<tool_call>{"name": "end_turn"}</tool_call>"#]);
        assert_matches!(&items[0], StreamItem::Call(call) if call.input == json!({}));
    }

    #[test]
    fn unterminated_tag_flushes_as_text() {
        let items = collect(&["prose <tool_call>{\"name\": \"x\""]);
        assert_eq!(joined_text(&items), "prose <tool_call>{\"name\": \"x\"");
    }

    #[test]
    fn angle_bracket_prose_is_not_held_forever() {
        let items = collect(&["a < b and a <t", "idy thing"]);
        assert_eq!(joined_text(&items), "a < b and a <tidy thing");
    }

    #[test]
    fn partial_tag_len_measures_suffixes() {
        assert_eq!(partial_tag_len("hello"), 0);
        assert_eq!(partial_tag_len("hello <"), 1);
        assert_eq!(partial_tag_len("hello <tool_c"), 7);
        assert_eq!(partial_tag_len("<tool_call"), 10);
    }
}

//! AST-aware adaptive chunking of block-structured source files.
//!
//! A file is parsed with tree-sitter, split at top-level declaration
//! boundaries (with leading comments attached forward onto the declaration
//! they document), then adaptively reshaped: oversize segments are split
//! recursively along container members, logical blocks, or as a last resort
//! raw line runs, and undersize neighbors are merged back together. The
//! result is a sequence of retrieval-sized chunks addressed by the SHA-256
//! of their text.

mod expand;
mod extract;

use crate::error::{IndexError, Result};
use crate::hasher::sha256_text;

/// One chunk of source: a contiguous line range with a semantic label.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk id, equal to `content_hash`.
    pub id: String,
    /// Root-relative forward-slash path of the source file.
    pub path: String,
    /// 1-based inclusive start line.
    pub start_line: usize,
    /// 1-based inclusive end line.
    pub end_line: usize,
    /// Exact text of the covered lines, newline-joined.
    pub text: String,
    /// Syntax kind of the dominating node (or a `_part` tag for line splits).
    pub node_kind: String,
    /// Declared symbol name, qualified `parent.child` for container members.
    pub symbol: Option<String>,
    /// Lowercase hex SHA-256 of `text`.
    pub content_hash: String,
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target token ceiling per chunk (best-effort).
    pub max_tokens: usize,
    /// Target token floor; smaller neighbors are merged.
    pub min_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            min_tokens: 30,
        }
    }
}

/// Intermediate unit of work: a 0-based inclusive line range plus the
/// structure discovered under it (container members or logical blocks).
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) kind: String,
    pub(crate) symbol: Option<String>,
    pub(crate) children: Vec<Segment>,
    pub(crate) blocks: Vec<(usize, usize)>,
}

impl Segment {
    pub(crate) fn plain(
        start: usize,
        end: usize,
        kind: impl Into<String>,
        symbol: Option<String>,
    ) -> Self {
        Self {
            start,
            end,
            kind: kind.into(),
            symbol,
            children: Vec::new(),
            blocks: Vec::new(),
        }
    }
}

/// Estimated token count of a 0-based inclusive line range: one token per
/// four characters, counting one extra character per line for the newline.
pub(crate) fn token_estimate(lines: &[&str], start: usize, end: usize) -> usize {
    if lines.is_empty() || start > end || start >= lines.len() {
        return 0;
    }
    let end = end.min(lines.len() - 1);
    let chars: usize = lines[start..=end]
        .iter()
        .map(|l| l.chars().count() + 1)
        .sum();
    chars.div_ceil(4)
}

/// Chunk one source file. Pure: identical inputs produce identical chunks,
/// including chunk ids.
///
/// # Errors
///
/// Returns [`IndexError::Parse`] if tree-sitter cannot parse the file.
pub fn chunk(path: &str, text: &str, config: &ChunkerConfig) -> Result<Vec<Chunk>> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let tree = parse(path, text)?;
    let mut segments = extract::top_level(&tree.root_node(), text);

    // A file with content but no recognized structure still gets indexed as
    // a single file-level segment.
    if segments.is_empty() && text.chars().any(|c| !c.is_whitespace()) {
        segments.push(Segment::plain(0, lines.len() - 1, "program", None));
    }

    let mut expanded = Vec::new();
    for segment in segments {
        expand::expand(segment, &lines, config, &mut expanded);
    }

    let merged = merge_small(expanded, &lines, config);

    Ok(merged
        .into_iter()
        .map(|segment| materialize(path, &lines, segment))
        .collect())
}

fn parse(path: &str, text: &str) -> Result<tree_sitter::Tree> {
    let grammar: tree_sitter::Language = if path.ends_with(".tsx") || path.ends_with(".jsx") {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    } else {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    };

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;
    parser
        .parse(text, None)
        .ok_or_else(|| IndexError::Parse(format!("parse failed for {path}")))
}

/// Left-to-right merge of undersize neighbors. When the smaller side is the
/// current segment, the merged segment adopts the next one's label; ties
/// keep the left label.
fn merge_small(segments: Vec<Segment>, lines: &[&str], config: &ChunkerConfig) -> Vec<Segment> {
    let mut iter = segments.into_iter();
    let Some(mut current) = iter.next() else {
        return Vec::new();
    };
    let mut current_tokens = token_estimate(lines, current.start, current.end);
    let mut out = Vec::new();

    for next in iter {
        let next_tokens = token_estimate(lines, next.start, next.end);
        if current_tokens < config.min_tokens || next_tokens < config.min_tokens {
            if current_tokens < next_tokens {
                current.kind = next.kind;
                current.symbol = next.symbol;
            }
            current.end = current.end.max(next.end);
            current_tokens = token_estimate(lines, current.start, current.end);
        } else {
            out.push(current);
            current = next;
            current_tokens = next_tokens;
        }
    }

    out.push(current);
    out
}

fn materialize(path: &str, lines: &[&str], segment: Segment) -> Chunk {
    let start = segment.start.min(lines.len() - 1);
    let end = segment.end.min(lines.len() - 1);
    let text = lines[start..=end].join("\n");
    let content_hash = sha256_text(&text);
    Chunk {
        id: content_hash.clone(),
        path: path.to_string(),
        start_line: start + 1,
        end_line: end + 1,
        text,
        node_kind: segment.kind,
        symbol: segment.symbol,
        content_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_tokens: usize, min_tokens: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens,
            min_tokens,
        }
    }

    fn assert_fidelity(source: &str, chunks: &[Chunk]) {
        let lines: Vec<&str> = source.lines().collect();
        for chunk in chunks {
            let expected = lines[chunk.start_line - 1..=chunk.end_line - 1].join("\n");
            assert_eq!(chunk.text, expected, "chunk text must equal its line range");
            assert_eq!(chunk.content_hash, sha256_text(&chunk.text));
            assert_eq!(chunk.id, chunk.content_hash);
            assert!(chunk.start_line >= 1);
            assert!(chunk.end_line <= lines.len());
        }
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let chunks = chunk("a.ts", "", &ChunkerConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn small_function_is_one_chunk() {
        let source = "function greet(name: string): string {\n  return `hello ${name}`;\n}\n";
        let chunks = chunk("a.ts", source, &cfg(512, 1)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_kind, "function_declaration");
        assert_eq!(chunks[0].symbol.as_deref(), Some("greet"));
        assert_fidelity(source, &chunks);
    }

    #[test]
    fn comment_attaches_to_following_declaration() {
        let source = "\
// Adds two numbers.
// Used everywhere.
function add(a: number, b: number): number {
  return a + b;
}
";
        let chunks = chunk("a.ts", source, &cfg(512, 1)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert!(chunks[0].text.contains("Adds two numbers"));
    }

    #[test]
    fn orphan_trailing_comment_is_dropped() {
        let source = "\
function one(): number {
  return 1;
}
// dangling note with nothing after it
";
        let chunks = chunk("a.ts", source, &cfg(512, 1)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn comment_only_file_falls_back_to_program_chunk() {
        let source = "// just a note\n// and another\n";
        let chunks = chunk("a.ts", source, &cfg(512, 1)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_kind, "program");
        assert_fidelity(source, &chunks);
    }

    #[test]
    fn determinism_same_input_same_chunks() {
        let source = "\
export function a(): number {
  const x = 1;
  return x;
}

export function b(): number {
  return 2;
}
";
        let first = chunk("a.ts", source, &cfg(20, 4)).unwrap();
        let second = chunk("a.ts", source, &cfg(20, 4)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tiny_neighbors_merge_into_one_chunk() {
        let source = "\
const a = 1;
const b = 2;
const c = 3;
";
        let chunks = chunk("a.ts", source, &cfg(512, 30)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn merge_adopts_label_of_larger_segment() {
        let source = "\
const tiny = 1;
function somewhatLongerFunction(): number {
  const value = 41;
  return value + 1;
}
";
        let chunks = chunk("a.ts", source, &cfg(512, 10)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_kind, "function_declaration");
        assert_eq!(chunks[0].symbol.as_deref(), Some("somewhatLongerFunction"));
    }

    #[test]
    fn oversize_class_splits_into_header_and_methods() {
        let mut source = String::from("class Calculator {\n");
        source.push_str("  // doubles the input value\n");
        source.push_str("  double(x: number): number {\n");
        for i in 0..12 {
            source.push_str(&format!("    const step{i} = x * 2 + {i};\n"));
        }
        source.push_str("    return x * 2;\n  }\n\n");
        source.push_str("  triple(x: number): number {\n");
        for i in 0..12 {
            source.push_str(&format!("    const step{i} = x * 3 + {i};\n"));
        }
        source.push_str("    return x * 3;\n  }\n}\n");

        let chunks = chunk("calc.ts", &source, &cfg(60, 4)).unwrap();
        assert!(chunks.len() >= 2, "expected method-level split, got {chunks:?}");

        let symbols: Vec<_> = chunks.iter().filter_map(|c| c.symbol.as_deref()).collect();
        assert!(symbols.iter().any(|s| s.contains("Calculator.double")));
        assert!(symbols.iter().any(|s| s.contains("Calculator.triple")));
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn container_expansion_produces_disjoint_ranges() {
        let mut source = String::from("export class Service {\n");
        for m in 0..5 {
            source.push_str(&format!("  method{m}(): number {{\n"));
            for i in 0..8 {
                source.push_str(&format!("    const v{i} = {i};\n"));
            }
            source.push_str(&format!("    return {m};\n  }}\n"));
        }
        source.push_str("}\n");

        let chunks = chunk("svc.ts", &source, &cfg(40, 2)).unwrap();
        for pair in chunks.windows(2) {
            assert!(
                pair[0].end_line < pair[1].start_line,
                "overlap between {:?} and {:?}",
                pair[0].symbol,
                pair[1].symbol
            );
        }
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn oversize_function_splits_by_logical_blocks() {
        let mut source = String::from("function process(input: number[]): number {\n");
        source.push_str("  let total = 0;\n");
        for i in 0..5 {
            source.push_str(&format!("  if (input.length > {i}) {{\n"));
            for j in 0..6 {
                source.push_str(&format!("    total += input[{i}] * {j};\n"));
            }
            source.push_str("  }\n");
        }
        source.push_str("  return total;\n}\n");

        let max_tokens = 40;
        let chunks = chunk("proc.ts", &source, &cfg(max_tokens, 2)).unwrap();
        assert!(chunks.len() >= 2, "expected block groups, got {chunks:?}");

        let lines: Vec<&str> = source.lines().collect();
        for chunk in &chunks {
            assert!(
                token_estimate(&lines, chunk.start_line - 1, chunk.end_line - 1) <= max_tokens,
                "chunk over ceiling: {chunk:?}"
            );
        }

        // Groups tile the function: contiguous, ending at the closing brace.
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_line + 1, pair[1].start_line);
        }
        assert_eq!(chunks.last().unwrap().end_line, lines.len());
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn factory_function_splits_by_inner_blocks() {
        let mut source = String::from("function makeCounter() {\n  return function counter() {\n");
        for i in 0..10 {
            source.push_str(&format!("    const tick{i} = {i};\n"));
        }
        source.push_str("    return 0;\n  };\n}\n");

        let chunks = chunk("factory.ts", &source, &cfg(15, 1)).unwrap();
        assert!(chunks.len() >= 2, "inner function body should split: {chunks:?}");
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn arrow_function_const_gets_block_split() {
        let mut source = String::from("export const handler = async (req: Request) => {\n");
        for i in 0..10 {
            source.push_str(&format!("  const field{i} = req.get({i});\n"));
        }
        source.push_str("  return null;\n};\n");

        let chunks = chunk("handler.ts", &source, &cfg(20, 1)).unwrap();
        assert!(chunks.len() >= 2, "arrow body should split: {chunks:?}");
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn oversize_function_signature_is_line_split() {
        let mut source = String::from("function configure(\n");
        for i in 0..12 {
            source.push_str(&format!(
                "  parameterNumber{i}: number = defaults.value({i}),\n"
            ));
        }
        source.push_str("): number {\n");
        source.push_str("  const total = parameterNumber0 + parameterNumber1;\n");
        source.push_str("  return total;\n}\n");

        let max_tokens = 25;
        let chunks = chunk("configure.ts", &source, &cfg(max_tokens, 1)).unwrap();
        assert!(
            chunks.iter().any(|c| c.node_kind.ends_with("_part")),
            "oversize signature should fall through to line parts: {chunks:?}"
        );

        let lines: Vec<&str> = source.lines().collect();
        for chunk in &chunks {
            if !chunk.node_kind.ends_with("_part") {
                assert!(
                    token_estimate(&lines, chunk.start_line - 1, chunk.end_line - 1) <= max_tokens,
                    "non-part chunk over ceiling: {chunk:?}"
                );
            }
        }
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn shorthand_properties_keep_their_names() {
        let mut source = String::from("export const registry = {\n");
        source.push_str("  alphaHandler,\n");
        for i in 0..6 {
            source.push_str(&format!("  entry{i}: {{ enabled: true, weight: {i} }},\n"));
        }
        source.push_str("  omegaHandler,\n};\n");

        let chunks = chunk("registry.ts", &source, &cfg(16, 1)).unwrap();
        let symbols: Vec<&str> = chunks.iter().filter_map(|c| c.symbol.as_deref()).collect();
        assert!(
            symbols.iter().any(|s| s.contains("alphaHandler")),
            "shorthand property lost its name: {symbols:?}"
        );
        assert!(symbols.iter().any(|s| s.contains("omegaHandler")));
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn object_literal_splits_by_properties() {
        let mut source = String::from("export const config = {\n");
        for i in 0..8 {
            source.push_str(&format!(
                "  option{i}: {{ enabled: true, weight: {i}, label: \"option number {i}\" }},\n"
            ));
        }
        source.push_str("};\n");

        let chunks = chunk("config.ts", &source, &cfg(20, 2)).unwrap();
        assert!(chunks.len() >= 2, "object should split by property: {chunks:?}");
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn unstructured_oversize_falls_back_to_line_parts() {
        let mut source = String::from("enum Big {\n");
        for i in 0..40 {
            source.push_str(&format!("  Variant{i} = {i},\n"));
        }
        source.push_str("}\n");

        let max_tokens = 30;
        let chunks = chunk("big.ts", &source, &cfg(max_tokens, 1)).unwrap();
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().any(|c| c.node_kind.ends_with("_part")));
        for chunk in &chunks {
            assert!(chunk.text.len() <= max_tokens * 4 + chunk.text.lines().count());
        }
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn interface_members_are_container_children() {
        let mut source = String::from("interface Shape {\n");
        for i in 0..12 {
            source.push_str(&format!("  corner{i}: {{ x: number, y: number, label: string }};\n"));
        }
        source.push_str("}\n");

        let chunks = chunk("shape.ts", &source, &cfg(20, 1)).unwrap();
        assert!(chunks.len() >= 2, "interface should split: {chunks:?}");
        assert_fidelity(&source, &chunks);
    }

    #[test]
    fn size_floor_respected_except_sole_chunk() {
        let source = "const only = 1;\n";
        let chunks = chunk("a.ts", source, &ChunkerConfig::default()).unwrap();
        // Sole chunk of its file may be under the floor.
        assert_eq!(chunks.len(), 1);

        let mut multi = String::new();
        for i in 0..6 {
            multi.push_str(&format!(
                "function f{i}(): number {{\n  const a = {i};\n  const b = a * 2;\n  return a + b;\n}}\n\n"
            ));
        }
        let config = cfg(30, 8);
        let chunks = chunk("multi.ts", &multi, &config).unwrap();
        let lines: Vec<&str> = multi.lines().collect();
        if chunks.len() > 1 {
            for chunk in &chunks {
                assert!(
                    token_estimate(&lines, chunk.start_line - 1, chunk.end_line - 1)
                        >= config.min_tokens,
                    "undersize chunk survived merge: {chunk:?}"
                );
            }
        }
    }

    #[test]
    fn tsx_files_parse_with_tsx_grammar() {
        let source = "\
export function Badge({ label }: { label: string }) {
  return <span className=\"badge\">{label}</span>;
}
";
        let chunks = chunk("badge.tsx", source, &cfg(512, 1)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_fidelity(source, &chunks);
    }

    #[test]
    fn import_and_export_statements_are_segments() {
        let source = "\
import { readFile } from \"fs\";

export const VERSION = \"1.0.0\";

export default function main(): void {
  readFile(VERSION, () => {});
}
";
        let chunks = chunk("main.ts", source, &cfg(512, 1)).unwrap();
        let all: String = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
        assert!(all.contains("import { readFile }"));
        assert!(all.contains("export const VERSION"));
        assert!(all.contains("export default function main"));
        assert_fidelity(source, &chunks);
    }

    #[test]
    fn token_estimate_counts_newlines() {
        let lines = vec!["abc", "de"];
        // (3+1) + (2+1) = 7 chars -> ceil(7/4) = 2
        assert_eq!(token_estimate(&lines, 0, 1), 2);
        assert_eq!(token_estimate(&lines, 0, 0), 1);
        assert_eq!(token_estimate(&lines, 5, 9), 0);
    }
}

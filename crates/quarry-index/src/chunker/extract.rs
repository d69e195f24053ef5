//! Top-level segment extraction and structural analysis.
//!
//! Walks the syntax tree's immediate children in source order, attaching
//! runs of leading comments forward onto the declaration they document, and
//! records each segment's internal structure (container members, logical
//! blocks, object properties) for the oversize expansion pass.

use tree_sitter::Node;

use super::Segment;

/// Node kinds recognized as top-level segments.
const TOP_LEVEL_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
    "internal_module",
    "module",
    "export_statement",
    "import_statement",
    "lexical_declaration",
    "variable_declaration",
    "expression_statement",
];

/// Method-level kinds inside a class or interface body.
const MEMBER_KINDS: &[&str] = &[
    "method_definition",
    "abstract_method_signature",
    "method_signature",
    "public_field_definition",
    "property_signature",
    "call_signature",
    "construct_signature",
    "index_signature",
];

/// Property kinds inside an object literal.
const OBJECT_MEMBER_KINDS: &[&str] = &[
    "pair",
    "method_definition",
    "spread_element",
    "shorthand_property_identifier",
];

/// Function-like node kinds.
const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "arrow_function",
    "function_expression",
    "function",
    "method_definition",
];

/// Direct body statements recorded as logical blocks.
const BLOCK_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_statement",
    "try_statement",
    "return_statement",
    "throw_statement",
    "lexical_declaration",
    "variable_declaration",
    "expression_statement",
];

/// Blocks spanning more than this many lines are opened one extra level.
const BLOCK_EXPAND_LINES: usize = 15;

pub(crate) fn top_level(root: &Node, src: &str) -> Vec<Segment> {
    collect_segments(root, src, TOP_LEVEL_KINDS)
}

/// Walk `parent`'s named children in source order with forward comment
/// attachment: consecutive comments are pending until the next recognized
/// node absorbs their span; unrecognized or error nodes reset the pending
/// run, and orphan comments are dropped.
fn collect_segments(parent: &Node, src: &str, recognized: &[&str]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut pending: Option<usize> = None;
    let mut cursor = parent.walk();

    for child in parent.named_children(&mut cursor) {
        let kind = child.kind();
        if kind == "comment" {
            pending.get_or_insert(child.start_position().row);
            continue;
        }
        if child.is_error() || !recognized.contains(&kind) {
            pending = None;
            continue;
        }

        let start = pending.take().unwrap_or_else(|| child.start_position().row);
        let mut segment = Segment::plain(
            start,
            child.end_position().row,
            kind,
            symbol_of(&child, src),
        );
        analyze(&child, src, &mut segment);
        segments.push(segment);
    }

    segments
}

/// Record the segment's internal structure: container members for classes
/// and interfaces, logical blocks for function-like nodes, properties for
/// object literals. Exported declarations are unwrapped first.
fn analyze(node: &Node, src: &str, segment: &mut Segment) {
    let decl = unwrap_export(node);

    if is_container(decl.kind()) {
        if let Some(body) = decl.child_by_field_name("body") {
            segment.children = collect_segments(&body, src, MEMBER_KINDS);
        }
        return;
    }

    if let Some(function) = unwrap_function(&decl) {
        segment.blocks = function_blocks(&function);
        return;
    }

    if let Some(object) = unwrap_object(&decl) {
        segment.children = collect_segments(&object, src, OBJECT_MEMBER_KINDS);
    }
}

fn is_container(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration" | "abstract_class_declaration" | "interface_declaration"
    )
}

fn unwrap_export<'t>(node: &Node<'t>) -> Node<'t> {
    if node.kind() == "export_statement" {
        if let Some(decl) = node
            .child_by_field_name("declaration")
            .or_else(|| node.child_by_field_name("value"))
        {
            return decl;
        }
    }
    *node
}

/// The function-like node behind a segment, if any: a direct function
/// declaration, or the initializer of `const f = () => { … }`.
fn unwrap_function<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    if FUNCTION_KINDS.contains(&node.kind()) {
        return Some(*node);
    }
    if matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
        let declarator = first_child_of_kind(node, "variable_declarator")?;
        let value = strip_wrappers(declarator.child_by_field_name("value")?);
        if FUNCTION_KINDS.contains(&value.kind()) {
            return Some(value);
        }
    }
    None
}

/// The object literal behind a segment, unwrapped through declarators and
/// `satisfies` / `as` wrappers.
fn unwrap_object<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    let mut current = *node;
    if matches!(current.kind(), "lexical_declaration" | "variable_declaration") {
        let declarator = first_child_of_kind(&current, "variable_declarator")?;
        current = declarator.child_by_field_name("value")?;
    }
    let current = strip_wrappers(current);
    (current.kind() == "object").then_some(current)
}

fn strip_wrappers<'t>(mut node: Node<'t>) -> Node<'t> {
    loop {
        match node.kind() {
            "satisfies_expression"
            | "as_expression"
            | "non_null_expression"
            | "parenthesized_expression" => match node.named_child(0) {
                Some(inner) => node = inner,
                None => break,
            },
            _ => break,
        }
    }
    node
}

fn first_child_of_kind<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).find(|c| c.kind() == kind)
}

fn symbol_of(node: &Node, src: &str) -> Option<String> {
    let decl = unwrap_export(node);
    // A shorthand object property is a bare identifier leaf: the node text
    // is the property name.
    if decl.kind() == "shorthand_property_identifier" {
        return Some(src[decl.byte_range()].to_string());
    }
    if let Some(name) = decl
        .child_by_field_name("name")
        .or_else(|| decl.child_by_field_name("key"))
    {
        return Some(src[name.byte_range()].to_string());
    }
    if matches!(decl.kind(), "lexical_declaration" | "variable_declaration") {
        let declarator = first_child_of_kind(&decl, "variable_declarator")?;
        let name = declarator.child_by_field_name("name")?;
        return Some(src[name.byte_range()].to_string());
    }
    None
}

/// Logical blocks of a function body: the direct statements whose kinds are
/// in the block set. A body that only returns a nested function (factory
/// pattern) is opened to the inner function's body instead.
fn function_blocks(function: &Node) -> Vec<(usize, usize)> {
    let Some(body) = function.child_by_field_name("body") else {
        return Vec::new();
    };
    if body.kind() != "statement_block" {
        return Vec::new();
    }
    statement_blocks(&body)
}

fn statement_blocks(body: &Node) -> Vec<(usize, usize)> {
    let mut cursor = body.walk();
    let statements: Vec<Node> = body
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();

    if statements.len() == 1 && statements[0].kind() == "return_statement" {
        if let Some(inner) = returned_function(&statements[0]) {
            if let Some(inner_body) = inner.child_by_field_name("body") {
                if inner_body.kind() == "statement_block" {
                    return statement_blocks(&inner_body);
                }
            }
        }
    }

    let mut blocks = Vec::new();
    for statement in &statements {
        if !BLOCK_KINDS.contains(&statement.kind()) {
            continue;
        }
        let start = statement.start_position().row;
        let end = statement.end_position().row;
        if end - start > BLOCK_EXPAND_LINES {
            let inner = inner_statements(statement);
            if !inner.is_empty() {
                blocks.extend(inner);
                continue;
            }
        }
        blocks.push((start, end));
    }
    blocks
}

fn returned_function<'t>(ret: &Node<'t>) -> Option<Node<'t>> {
    let value = strip_wrappers(ret.named_child(0)?);
    FUNCTION_KINDS.contains(&value.kind()).then_some(value)
}

/// One level deeper into a large compound statement: the direct statements
/// of its consequence/body/handler blocks, so if/else and try/catch chains
/// expose finer split points. Bounded to this single extra level.
fn inner_statements(statement: &Node) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut cursor = statement.walk();
    for child in statement.named_children(&mut cursor) {
        match child.kind() {
            "statement_block" => push_block_statements(&child, &mut ranges),
            "else_clause" | "catch_clause" | "finally_clause" => {
                let mut clause_cursor = child.walk();
                for grand in child.named_children(&mut clause_cursor) {
                    match grand.kind() {
                        "statement_block" => push_block_statements(&grand, &mut ranges),
                        "if_statement" => {
                            ranges.push((grand.start_position().row, grand.end_position().row));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    ranges
}

fn push_block_statements(block: &Node, ranges: &mut Vec<(usize, usize)>) {
    let mut cursor = block.walk();
    for statement in block.named_children(&mut cursor) {
        if statement.kind() == "comment" {
            continue;
        }
        ranges.push((statement.start_position().row, statement.end_position().row));
    }
}

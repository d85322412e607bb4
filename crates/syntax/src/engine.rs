//! Parsing engines.
//!
//! [`BlockEngine`] splits text into line blocks. Its incremental path diffs
//! the previous tree's text against the new text, keeps every block wholly
//! inside the common prefix or suffix, and reparses only the lines between.

use std::hash::Hasher;
use std::ops::Range;

use quill_worker::CancelToken;
use ropey::Rope;
use rustc_hash::FxHasher;

use crate::{Block, BlockKind, ReparseError, SyntaxTree};

/// Lines parsed between cancellation checks.
const CANCEL_CHECK_LINES: usize = 256;

/// Abstract parsing engine (for test mockability).
pub trait SyntaxEngine: Send + Sync {
	/// Parses `text` from scratch.
	fn parse(&self, text: &Rope, cancel: &CancelToken) -> Result<SyntaxTree, ReparseError>;

	/// Produces a tree for `text`, reusing what it can from `old`.
	fn reparse(&self, old: &SyntaxTree, text: &Rope, cancel: &CancelToken) -> Result<SyntaxTree, ReparseError> {
		let _ = old;
		self.parse(text, cancel)
	}
}

/// Line-block engine used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockEngine;

impl BlockEngine {
	/// Parses a line-aligned region of `text`, appending blocks to `out`.
	fn parse_region(text: &Rope, range: Range<usize>, cancel: &CancelToken, out: &mut Vec<Block>) -> Result<(), ReparseError> {
		let mut line = String::new();
		let mut line_len = 0usize;
		let mut offset = range.start;
		let mut emitted = 0usize;

		for ch in text.slice(range).chars() {
			line.push(ch);
			line_len += 1;
			offset += 1;
			if ch == '\n' {
				if emitted % CANCEL_CHECK_LINES == 0 {
					cancel.check()?;
				}
				out.push(classify(&line, offset - line_len..offset));
				emitted += 1;
				line.clear();
				line_len = 0;
			}
		}
		if line_len > 0 {
			out.push(classify(&line, offset - line_len..offset));
		}
		Ok(())
	}
}

impl SyntaxEngine for BlockEngine {
	fn parse(&self, text: &Rope, cancel: &CancelToken) -> Result<SyntaxTree, ReparseError> {
		let mut blocks = Vec::new();
		Self::parse_region(text, 0..text.len_chars(), cancel, &mut blocks)?;
		Ok(SyntaxTree::new(text.clone(), blocks, 0))
	}

	fn reparse(&self, old: &SyntaxTree, text: &Rope, cancel: &CancelToken) -> Result<SyntaxTree, ReparseError> {
		cancel.check()?;
		let old_text = old.text();
		let old_len = old_text.len_chars();
		let new_len = text.len_chars();
		let blocks = old.blocks();

		let prefix = common_prefix(old_text, text);
		if prefix == old_len && prefix == new_len {
			return Ok(SyntaxTree::new(text.clone(), blocks.to_vec(), blocks.len()));
		}
		let suffix = common_suffix(old_text, text, old_len.min(new_len) - prefix);
		let delta = new_len as isize - old_len as isize;

		// Leading blocks must end inside the prefix on a line break; the last
		// line of a text without trailing newline can still grow.
		let mut head = blocks.partition_point(|b| b.range.end <= prefix);
		if head > 0 && old_text.char(blocks[head - 1].range.end - 1) != '\n' {
			head -= 1;
		}

		// Trailing blocks must start inside the suffix, right after a line
		// break in the new text.
		let suffix_start = old_len - suffix;
		let mut tail = blocks.partition_point(|b| b.range.start < suffix_start);
		if let Some(first) = blocks.get(tail) {
			let start = first.range.start.wrapping_add_signed(delta);
			if start > 0 && text.char(start - 1) != '\n' {
				tail += 1;
			}
		}

		let region_start = if head == 0 { 0 } else { blocks[head - 1].range.end };
		let region_end = blocks.get(tail).map_or(new_len, |b| b.range.start.wrapping_add_signed(delta));

		let mut out = Vec::with_capacity(blocks.len());
		out.extend_from_slice(&blocks[..head]);
		Self::parse_region(text, region_start..region_end, cancel, &mut out)?;
		out.extend(blocks[tail..].iter().map(|b| b.shifted(delta)));

		let reused = head + (blocks.len() - tail);
		tracing::trace!(head, tail = blocks.len() - tail, region = ?(region_start..region_end), "syntax.reparse.incremental");
		Ok(SyntaxTree::new(text.clone(), out, reused))
	}
}

fn classify(line: &str, range: Range<usize>) -> Block {
	let mut hasher = FxHasher::default();
	hasher.write(line.as_bytes());
	let trimmed = line.trim();
	let kind = if trimmed.is_empty() {
		BlockKind::Blank
	} else if trimmed.starts_with("//") || trimmed.starts_with('#') {
		BlockKind::Comment
	} else {
		BlockKind::Code
	};
	Block {
		range,
		kind,
		hash: hasher.finish(),
	}
}

fn common_prefix(a: &Rope, b: &Rope) -> usize {
	a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &Rope, b: &Rope, max: usize) -> usize {
	let mut ia = a.chars_at(a.len_chars());
	let mut ib = b.chars_at(b.len_chars());
	let mut n = 0;
	while n < max {
		match (ia.prev(), ib.prev()) {
			(Some(x), Some(y)) if x == y => n += 1,
			_ => break,
		}
	}
	n
}

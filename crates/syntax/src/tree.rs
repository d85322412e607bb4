use std::ops::Range;
use std::sync::Arc;

use ropey::Rope;

/// Classification of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
	Blank,
	Comment,
	Code,
}

/// One leaf of the tree: a line, including its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	/// Char range in the tree's text.
	pub range: Range<usize>,
	pub kind: BlockKind,
	/// Content hash, stable across shifts.
	pub hash: u64,
}

impl Block {
	pub(crate) fn shifted(&self, delta: isize) -> Self {
		Self {
			range: self.range.start.wrapping_add_signed(delta)..self.range.end.wrapping_add_signed(delta),
			kind: self.kind,
			hash: self.hash,
		}
	}
}

/// Parsed view of a document's text.
///
/// Cloning is cheap: text is a rope and blocks are shared.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
	text: Rope,
	blocks: Arc<[Block]>,
	reused: usize,
}

impl SyntaxTree {
	pub(crate) fn new(text: Rope, blocks: Vec<Block>, reused: usize) -> Self {
		Self {
			text,
			blocks: blocks.into(),
			reused,
		}
	}

	pub fn text(&self) -> &Rope {
		&self.text
	}

	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	pub fn blocks(&self) -> &[Block] {
		&self.blocks
	}

	/// Number of blocks carried over from the previous tree by an incremental
	/// reparse. Zero for full parses.
	pub fn reused_blocks(&self) -> usize {
		self.reused
	}

	/// Returns the block containing `offset`, if any.
	pub fn block_at(&self, offset: usize) -> Option<&Block> {
		let idx = self.blocks.partition_point(|b| b.range.end <= offset);
		self.blocks.get(idx).filter(|b| b.range.contains(&offset))
	}

	/// Returns true if two trees classify the same text identically.
	pub fn same_shape(&self, other: &SyntaxTree) -> bool {
		self.blocks.len() == other.blocks.len() && self.blocks.iter().zip(other.blocks.iter()).all(|(a, b)| a == b)
	}
}

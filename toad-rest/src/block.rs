use tinyvec::ArrayVec;

/// Value of a Block2 option ([RFC7959 section 2.2](https://www.rfc-editor.org/rfc/rfc7959#section-2.2))
///
/// Three items of information are packed into it:
/// * the size of the block ([`Block::size`])
/// * whether more blocks are following ([`Block::more`])
/// * the relative number of the block ([`Block::num`]) within a sequence of blocks with the given size.
///
/// ```
/// use toad_rest::block::Block;
///
/// let block = Block::new(64, 2, true);
/// assert_eq!(block.size(), 64);
/// assert_eq!(block.num(), 2);
/// assert!(block.more());
/// assert_eq!(block.offset(), 128);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);

impl Block {
  /// Smallest block size expressible
  pub const MIN_SIZE: u16 = 16;

  /// Largest block size expressible
  pub const MAX_SIZE: u16 = 1024;

  /// Create a block option value.
  ///
  /// `size` is clamped to `16..=1024` then rounded down to a power of two.
  pub fn new(size: u16, num: u32, more: bool) -> Self {
    let num = num << 4;
    let more = u32::from(more) << 3;

    Self(num | more | u32::from(Self::szx_of(size)))
  }

  /// Round `size` to a block size that can be expressed
  pub fn valid_size(size: u16) -> u16 {
    2u16.pow(u32::from(Self::szx_of(size)) + 4)
  }

  fn szx_of(size: u16) -> u8 {
    let size = size.clamp(Self::MIN_SIZE, Self::MAX_SIZE);
    let log2 = 15 - size.leading_zeros();
    (log2 - 4) as u8
  }

  /// Size of this block in bytes
  pub fn size(&self) -> u16 {
    // szx 7 is reserved
    let szx = (self.0 & 0b111).min(6);
    2u16.pow(szx + 4)
  }

  /// Are there more blocks after this one?
  pub fn more(&self) -> bool {
    (self.0 & 0b1000) >> 3 == 1
  }

  /// Block number, counting from zero
  pub fn num(&self) -> u32 {
    self.0 >> 4
  }

  /// Byte offset of this block within the whole representation
  pub fn offset(&self) -> u32 {
    self.num().saturating_mul(u32::from(self.size()))
  }

  /// Decode an option value.
  ///
  /// Yields `None` if the value is longer than 3 bytes.
  pub fn from_option_value(bytes: &[u8]) -> Option<Self> {
    if bytes.len() > 3 {
      return None;
    }

    Some(Self(bytes.iter()
                   .fold(0u32, |n, b| (n << 8) | u32::from(*b))))
  }

  /// Encode as an option value, using as few bytes as possible.
  pub fn to_option_value(&self) -> ArrayVec<[u8; 4]> {
    self.0
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect()
  }
}

impl From<Block> for u32 {
  fn from(b: Block) -> Self {
    b.0
  }
}

impl From<u32> for Block {
  fn from(n: u32) -> Self {
    Block(n)
  }
}

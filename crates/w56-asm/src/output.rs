//! Assembled output encoders: a flat binary word stream and a card-deck
//! text container, plus an optional disassembly listing.
//!
//! The flat binary is a single contiguous stream of MSB-first 32-bit
//! words, loaded by the emulator starting at address 0. Segments are laid
//! out into it at their own base addresses; any gap between address 0 and
//! the lowest segment's base is zero-filled, and a warning is returned (not
//! an error — the encoder still writes a file) when that gap is nonzero.

use w56_core::Instruction;
use w56_carddeck::{write_deck, CardRecord, RecordKind};

use crate::segment::Segment;

/// Max words per card-deck record, per the card-deck text format.
const WORDS_PER_CARD: usize = 31;

/// Lays `segments` out into one zero-padded flat byte buffer spanning from
/// address 0 through the highest segment's end address, serialized
/// MSB-first. Returns a warning string if the lowest non-empty segment's
/// base isn't 0 (loading still proceeds at address 0, so the gap is just
/// wasted space, not a correctness problem).
#[must_use]
pub fn encode_binary(segments: &[Segment]) -> (Vec<u8>, Option<String>) {
    let nonempty: Vec<&Segment> = segments.iter().filter(|s| !s.is_empty()).collect();
    if nonempty.is_empty() {
        return (Vec::new(), None);
    }
    let lowest_base = nonempty.iter().map(|s| s.base).min().unwrap_or(0);
    let highest_end = nonempty
        .iter()
        .map(|s| s.base + s.len() as u32)
        .max()
        .unwrap_or(0);

    let mut words = vec![0u32; highest_end as usize];
    for seg in &nonempty {
        for (i, word) in seg.words.iter().enumerate() {
            words[(seg.base as usize) + i] = *word;
        }
    }

    let mut out = Vec::with_capacity(words.len() * 4);
    for word in words {
        out.extend_from_slice(&word.to_be_bytes());
    }

    let warning = (lowest_base != 0)
        .then(|| format!("lowest segment base is 0x{lowest_base:08X}, not 0; binary still loads at address 0"));
    (out, warning)
}

/// Parses a flat MSB-first word stream back into memory words, for loading
/// directly at address 0.
#[must_use]
pub fn decode_binary(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes(chunk.try_into().expect("chunks_exact(4) yields 4-byte slices")))
        .collect()
}

/// Card decks hold at most [`WORDS_PER_CARD`] words per card, so a segment
/// longer than that is split across multiple records, each with its own
/// address line.
#[must_use]
pub fn encode_card_deck(segments: &[Segment]) -> String {
    let mut records = Vec::new();
    for seg in segments.iter().filter(|s| !s.is_empty()) {
        for (chunk_index, chunk) in seg.words.chunks(WORDS_PER_CARD).enumerate() {
            records.push(CardRecord {
                kind: RecordKind::Code,
                base_addr: seg.base + (chunk_index * WORDS_PER_CARD) as u32,
                words: chunk.to_vec(),
            });
        }
    }
    write_deck(&records)
}

/// A listing in the same style the interactive runner prints: address,
/// raw hex word, and disassembly for anything that decodes as a valid
/// instruction.
#[must_use]
pub fn listing(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        if seg.is_empty() {
            continue;
        }
        out.push_str(&format!("; segment at 0x{:08X}\n", seg.base));
        let mut i = 0usize;
        while i < seg.words.len() {
            let addr = seg.base + i as u32;
            let word = seg.words[i];
            let ins = Instruction::decode(word);
            if ins.is_valid() && ins.literal_in_use && i + 1 < seg.words.len() {
                let literal = seg.words[i + 1];
                out.push_str(&format!(
                    "0x{addr:08X}  {word:08X} {literal:08X}  {}\n",
                    ins.disassemble(Some(literal))
                ));
                i += 2;
            } else if ins.is_valid() {
                out.push_str(&format!("0x{addr:08X}  {word:08X}           {}\n", ins.disassemble(None)));
                i += 1;
            } else {
                out.push_str(&format!("0x{addr:08X}  {word:08X}           0x{word:08X}\n"));
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_lays_out_segments_at_their_base_and_round_trips() {
        let mut a = Segment::new(0, "a.asm");
        a.add_word(1);
        a.add_word(2);
        let mut b = Segment::new(4, "a.asm");
        b.add_word(3);
        let (encoded, warning) = encode_binary(&[a, b]);
        assert!(warning.is_none());
        let decoded = decode_binary(&encoded);
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn binary_warns_when_lowest_base_is_not_zero() {
        let mut a = Segment::new(0x100, "a.asm");
        a.add_word(1);
        let (_, warning) = encode_binary(&[a]);
        assert!(warning.is_some());
    }

    #[test]
    fn empty_segments_are_skipped_on_output() {
        let empty = Segment::new(0x300, "a.asm");
        let (encoded, warning) = encode_binary(&[empty]);
        assert!(encoded.is_empty());
        assert!(warning.is_none());
    }

    #[test]
    fn card_deck_carries_the_segment_base() {
        let mut s = Segment::new(0x10, "a.asm");
        s.add_word(0xAABBCCDD);
        let deck = encode_card_deck(&[s]);
        assert!(deck.starts_with("<C>"));
        assert!(deck.contains("00000010"));
    }

    #[test]
    fn card_deck_chunks_long_segments_into_31_word_cards() {
        let mut s = Segment::new(0, "a.asm");
        for i in 0..40u32 {
            s.add_word(i);
        }
        let deck = encode_card_deck(&[s]);
        assert_eq!(deck.matches("<C>").count(), 2);
        assert!(deck.contains("00000000"));
        assert!(deck.contains(&format!("{:08X}", WORDS_PER_CARD)));
    }

    #[test]
    fn listing_disassembles_valid_instructions() {
        let mut s = Segment::new(0, "a.asm");
        s.add_word(Instruction::encode(
            0xFF,
            w56_core::RegisterArg {
                kind: w56_core::OperandKind::Unused,
                reg: 0,
            },
            w56_core::RegisterArg {
                kind: w56_core::OperandKind::Unused,
                reg: 0,
            },
            w56_core::RegisterArg {
                kind: w56_core::OperandKind::Unused,
                reg: 0,
            },
        ));
        let text = listing(&[s]);
        assert!(text.contains("HALT"));
    }
}

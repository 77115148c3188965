// Licensed under the Apache-2.0 license

//! Word-granular FIFO fill and drain.
//!
//! Both directions move whole 4-byte words in one burst, then handle a 1-3
//! byte tail with a single extra word. They only ever move what the FIFO can
//! take or holds right now, so they are called again on each data request.

use crate::i2c::registers::{Reg, RegisterBus, Registers};

/// Hardware FIFO depth in words; the status fields are four bits wide.
pub const FIFO_DEPTH: usize = 16;

const WORD: usize = 4;

/// Push as much of `pending` into the transmit FIFO as fits.
///
/// Returns the number of bytes consumed. On return either the FIFO has no
/// free words left or every byte of `pending` was queued.
pub fn fill_tx<B: RegisterBus>(regs: &Registers<B>, pending: &[u8]) -> usize {
    let mut free = regs.tx_fifo_free().min(FIFO_DEPTH);
    let whole = (pending.len() / WORD).min(free);
    let (body, tail) = pending.split_at(whole * WORD);

    let mut scratch = [0u32; FIFO_DEPTH];
    for (slot, chunk) in scratch.iter_mut().zip(body.chunks_exact(WORD)) {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(chunk);
        *slot = u32::from_le_bytes(bytes);
    }
    if let Some(words) = scratch.get(..whole) {
        regs.write_burst(Reg::TxFifo, words);
    }
    free -= whole;
    let mut moved = whole * WORD;

    if free > 0 && !tail.is_empty() && tail.len() < WORD {
        let mut bytes = [0u8; WORD];
        if let Some(dst) = bytes.get_mut(..tail.len()) {
            dst.copy_from_slice(tail);
        }
        regs.write(Reg::TxFifo, u32::from_le_bytes(bytes));
        moved += tail.len();
    }

    moved
}

/// Pull as much of `dest` out of the receive FIFO as is available.
///
/// Returns the number of bytes written. A trailing partial word is read in
/// full and only the bytes `dest` still needs are kept.
pub fn drain_rx<B: RegisterBus>(regs: &Registers<B>, dest: &mut [u8]) -> usize {
    let mut available = regs.rx_fifo_count().min(FIFO_DEPTH);
    let whole = (dest.len() / WORD).min(available);

    let mut scratch = [0u32; FIFO_DEPTH];
    if let Some(words) = scratch.get_mut(..whole) {
        regs.read_burst(Reg::RxFifo, words);
    }
    let (body, tail) = dest.split_at_mut(whole * WORD);
    for (chunk, word) in body.chunks_exact_mut(WORD).zip(scratch.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    available -= whole;
    let mut moved = whole * WORD;

    if available > 0 && !tail.is_empty() && tail.len() < WORD {
        let bytes = regs.read(Reg::RxFifo).to_le_bytes();
        if let Some(src) = bytes.get(..tail.len()) {
            tail.copy_from_slice(src);
        }
        moved += tail.len();
    }

    moved
}

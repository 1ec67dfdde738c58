//! The tag dictionary region: every distinct logical tag known to the
//! database, written once per checkpoint so a cold reader can enumerate
//! tag keys without scanning the full data section (spec.md §4.1).

use std::io::Cursor;

use entitydb_core::Result;

use crate::codec::{read_str, write_str};

pub fn encode(tags: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    for tag in tags {
        write_str(&mut buf, tag);
    }
    buf
}

pub fn decode(bytes: &[u8]) -> Result<Vec<String>> {
    let mut cur = Cursor::new(bytes);
    let mut tags = Vec::new();
    while (cur.position() as usize) < bytes.len() {
        tags.push(read_str(&mut cur)?);
    }
    Ok(tags)
}

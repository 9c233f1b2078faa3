use anyhow::{bail, Result};

/// Extract the positional coordinate key from a FASTQ read name.
///
/// Illumina read names look like
/// `M03699:250:000000000-DT36J:1:1102:5914:5953 1:N:0:GACGAGATTA+ACATTATCCT`.
/// The first whitespace-delimited token is colon-delimited; fields 0-2 are
/// instrument, run and flowcell identifiers, fields 3+ are lane, tile, x, y
/// and any trailing fields. The key is everything after the third colon,
/// kept verbatim. Two reads with the same key are the same physical read
/// position across files.
pub fn extract_coordinate_key(read_name: &str) -> Result<String> {
    let token = read_name.split_whitespace().next().unwrap_or("");
    let mut num_colons = 0;
    for (i, b) in token.bytes().enumerate() {
        if b == b':' {
            num_colons += 1;
            if num_colons == 3 {
                return Ok(token[i + 1..].to_string());
            }
        }
    }
    bail!(
        "Malformed read name, expected at least 4 ':'-separated fields: {}",
        read_name
    );
}

/// Tile identity of a coordinate key: the first two ':'-fields joined with '_'.
/// Since the key starts with the lane field, the tile id is lane-qualified
/// (e.g. key `4:1101:5914:5953` -> tile `4_1101`).
pub fn derive_tile_id(key: &str) -> String {
    let mut fields = key.split(':');
    match (fields.next(), fields.next()) {
        (Some(lane), Some(tile)) => format!("{}_{}", lane, tile),
        (Some(lane), None) => lane.to_string(),
        _ => String::new(),
    }
}

/// Turns a delta encoded sequence into absolute values, keeping positional order.
///
/// The running sum starts at 0. Sums wrap instead of panicking so that a
/// malformed block cannot abort a worker.
#[inline]
pub fn delta_decode(deltas: &[i64]) -> Vec<i64> {
    let mut output = vec![0i64; deltas.len()];
    delta_decode_into(deltas, &mut output, 0);
    output
}

/// Decodes `input` into `output` continuing from `last`, returns the final value.
#[inline]
pub fn delta_decode_into(input: &[i64], output: &mut [i64], mut last: i64) -> i64 {
    for (out, &delta) in output.iter_mut().zip(input) {
        last = last.wrapping_add(delta);
        *out = last;
    }
    last
}

/// Inverse of [`delta_decode`].
pub fn delta_encode(values: &[i64]) -> Vec<i64> {
    let mut last = 0i64;
    values
        .iter()
        .map(|&v| {
            let delta = v.wrapping_sub(last);
            last = v;
            delta
        })
        .collect()
}

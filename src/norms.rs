//! Vector norms (not normalization; see `normalize` for that).

pub fn l1_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x.abs()).sum()
}

/// L1 with an explicit sign test instead of `abs`.
pub fn l1_norm_if_test(v: &[f32]) -> f32 {
    let mut total = 0.0f32;
    for &x in v {
        if x < 0.0 {
            total -= x;
        } else {
            total += x;
        }
    }
    total
}

/// L1 with `abs` done by clearing the sign bit.
pub fn l1_norm_bitwise_fabs(v: &[f32]) -> f32 {
    let mut total = 0.0f32;
    for &x in v {
        total += f32::from_bits(x.to_bits() & 0x7FFF_FFFF);
    }
    total
}

pub fn l2_squared_norm(v: &[f32]) -> f32 {
    crate::reduce::sum_squares(v)
}

pub fn l2_norm(v: &[f32]) -> f32 {
    l2_squared_norm(v).sqrt()
}

pub fn l3_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x.abs().powi(3)).sum::<f32>().cbrt()
}

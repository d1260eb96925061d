/// 中心移動平均による時系列の平滑化
///
/// 各インデックスの前後 `window / 2` 点を平均する。端では窓を縮めて平均するので、
/// ゼロ埋めや折り返しで境界が歪まない。NaN (角度未定義) は平均から除外し、
/// 窓内が全て NaN なら出力も NaN。出力長は常に入力長と同じ。
///
/// `window` が 0 または 1 のときは恒等変換。
pub fn smooth(series: &[f32], window: usize) -> Vec<f32> {
    let half = window / 2;
    if half == 0 {
        return series.to_vec();
    }

    // 累積和で O(n)。NaN は和にも個数にも入れない
    let mut sum = Vec::with_capacity(series.len() + 1);
    let mut count = Vec::with_capacity(series.len() + 1);
    sum.push(0.0f64);
    count.push(0usize);
    for &v in series {
        let (s, c) = (sum[sum.len() - 1], count[count.len() - 1]);
        if v.is_nan() {
            sum.push(s);
            count.push(c);
        } else {
            sum.push(s + v as f64);
            count.push(c + 1);
        }
    }

    let n = series.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            let c = count[end] - count[start];
            if c == 0 {
                f32::NAN
            } else {
                ((sum[end] - sum[start]) / c as f64) as f32
            }
        })
        .collect()
}

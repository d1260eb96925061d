use nalgebra::Vector3;

/// 頂点 `b` における内角 (度, 0〜180)
///
/// `a`/`c` のどちらかが `b` と一致する場合 (ベクトル長0) や座標が非有限の場合は
/// `f32::NAN` を返す。下流の平滑化・中央値は NaN を欠損として読み飛ばす。
///
/// 2D座標は `[x, y, 0.0]` として渡せばよい。
pub fn angle_deg<P: Into<Vector3<f32>>>(a: P, b: P, c: P) -> f32 {
    let (a, b, c) = (a.into(), b.into(), c.into());
    let v1 = a - b;
    let v2 = c - b;

    let n1 = v1.norm();
    let n2 = v2.norm();
    if !(n1 > 0.0 && n2 > 0.0) || !n1.is_finite() || !n2.is_finite() {
        return f32::NAN;
    }

    // 共線の場合の丸め誤差で acos の定義域を外れないようにクランプ
    let cos = (v1.dot(&v2) / (n1 * n2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// 2D座標用のショートカット
pub fn angle_deg_2d(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    angle_deg([a[0], a[1], 0.0], [b[0], b[1], 0.0], [c[0], c[1], 0.0])
}

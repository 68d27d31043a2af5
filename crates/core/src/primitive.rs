use glam::Vec3;

const BILINEAR_MAX_ITERS: usize = 32;
const BILINEAR_MAX_HALVINGS: usize = 12;
const BILINEAR_EPS: f32 = 1.0e-7;
const RAY_UV_EPS: f64 = 1.0e-6;
const RAY_RESIDUAL_EPS: f64 = 1.0e-8;

/// Evaluation a capture or deform pass needs from a surface primitive.
pub trait SurfacePrimitive {
    fn position_at(&self, u: f32, v: f32) -> Vec3;
    fn normal_at(&self, u: f32, v: f32) -> Vec3;
    fn interpolation_weights_at(&self, u: f32, v: f32) -> VertexWeights;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexWeights {
    len: usize,
    weights: [f32; 4],
}

impl VertexWeights {
    fn new(weights: &[f32]) -> Self {
        let mut out = [0.0; 4];
        let len = weights.len().min(4);
        out[..len].copy_from_slice(&weights[..len]);
        Self { len, weights: out }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pairs of (local vertex index, weight).
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.weights[..self.len].iter().copied().enumerate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub u: f32,
    pub v: f32,
    pub position: Vec3,
    pub distance_sq: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub points: [Vec3; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub points: [Vec3; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Triangle(Triangle),
    Quad(Quad),
}

impl SurfacePrimitive for Triangle {
    fn position_at(&self, u: f32, v: f32) -> Vec3 {
        let [a, b, c] = self.points;
        a * (1.0 - u - v) + b * u + c * v
    }

    fn normal_at(&self, _u: f32, _v: f32) -> Vec3 {
        let [a, b, c] = self.points;
        (b - a).cross(c - a).normalize_or_zero()
    }

    fn interpolation_weights_at(&self, u: f32, v: f32) -> VertexWeights {
        VertexWeights::new(&[1.0 - u - v, u, v])
    }
}

impl Triangle {
    pub fn closest_point(&self, p: Vec3) -> ClosestPoint {
        let [a, b, c] = self.points;
        let (position, bary) = closest_point_on_triangle(p, a, b, c);
        ClosestPoint {
            u: bary[1],
            v: bary[2],
            position,
            distance_sq: p.distance_squared(position),
        }
    }

    pub fn intersect_ray(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32, f32)> {
        let [a, b, c] = self.points;
        let (t, bary) = ray_triangle_intersect(origin, dir, a, b, c)?;
        Some((t, bary[1], bary[2]))
    }
}

impl SurfacePrimitive for Quad {
    fn position_at(&self, u: f32, v: f32) -> Vec3 {
        let [p0, p1, p2, p3] = self.points;
        p0 * ((1.0 - u) * (1.0 - v)) + p1 * (u * (1.0 - v)) + p2 * (u * v) + p3 * ((1.0 - u) * v)
    }

    fn normal_at(&self, u: f32, v: f32) -> Vec3 {
        let (du, dv) = self.derivatives(u, v);
        let normal = du.cross(dv);
        if normal.length_squared() > 1.0e-20 {
            return normal.normalize();
        }
        let [p0, p1, p2, p3] = self.points;
        (p2 - p0).cross(p3 - p1).normalize_or_zero()
    }

    fn interpolation_weights_at(&self, u: f32, v: f32) -> VertexWeights {
        VertexWeights::new(&[
            (1.0 - u) * (1.0 - v),
            u * (1.0 - v),
            u * v,
            (1.0 - u) * v,
        ])
    }
}

impl Quad {
    fn derivatives(&self, u: f32, v: f32) -> (Vec3, Vec3) {
        let [p0, p1, p2, p3] = self.points;
        let du = (p1 - p0) * (1.0 - v) + (p2 - p3) * v;
        let dv = (p3 - p0) * (1.0 - u) + (p2 - p1) * u;
        (du, dv)
    }

    // Mixed derivative d2P/dudv; constant over a bilinear patch.
    fn twist(&self) -> Vec3 {
        let [p0, p1, p2, p3] = self.points;
        p0 - p1 + p2 - p3
    }

    // Split along p0-p2; (u, v) of a point on either half is exact for parallelograms.
    fn halves(&self) -> [[Vec3; 3]; 2] {
        let [p0, p1, p2, p3] = self.points;
        [[p0, p1, p2], [p0, p2, p3]]
    }

    fn half_to_uv(half: usize, bary: [f32; 3]) -> (f32, f32) {
        if half == 0 {
            (bary[1] + bary[2], bary[2])
        } else {
            (bary[1], bary[1] + bary[2])
        }
    }

    fn sample(&self, p: Vec3, u: f32, v: f32) -> ClosestPoint {
        let position = self.position_at(u, v);
        ClosestPoint {
            u,
            v,
            position,
            distance_sq: p.distance_squared(position),
        }
    }

    pub fn closest_point(&self, p: Vec3) -> ClosestPoint {
        let mut best = self.closest_on_border(p);
        let mut seeds = [(0.5, 0.5); 3];
        for (half, [a, b, c]) in self.halves().into_iter().enumerate() {
            let (_, bary) = closest_point_on_triangle(p, a, b, c);
            seeds[half] = Self::half_to_uv(half, bary);
        }
        for (u, v) in seeds {
            let (u, v) = self.descend_uv(p, u, v);
            let candidate = self.sample(p, u, v);
            if candidate.distance_sq < best.distance_sq {
                best = candidate;
            }
        }
        best
    }

    // Bilinear patch edges are straight segments.
    fn closest_on_border(&self, p: Vec3) -> ClosestPoint {
        let [p0, p1, p2, p3] = self.points;
        let edges = [
            (p0, p1, (0.0, 0.0), (1.0, 0.0)),
            (p1, p2, (1.0, 0.0), (1.0, 1.0)),
            (p3, p2, (0.0, 1.0), (1.0, 1.0)),
            (p0, p3, (0.0, 0.0), (0.0, 1.0)),
        ];
        let mut best: Option<ClosestPoint> = None;
        for (a, b, uv_a, uv_b) in edges {
            let ab = b - a;
            let len_sq = ab.length_squared();
            let s = if len_sq > 0.0 {
                ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let u = uv_a.0 + (uv_b.0 - uv_a.0) * s;
            let v = uv_a.1 + (uv_b.1 - uv_a.1) * s;
            let candidate = self.sample(p, u, v);
            if !best.is_some_and(|best| best.distance_sq <= candidate.distance_sq) {
                best = Some(candidate);
            }
        }
        best.unwrap_or_else(|| self.sample(p, 0.0, 0.0))
    }

    // Damped Newton on |P(u, v) - p|^2 over the unit square.
    fn descend_uv(&self, p: Vec3, mut u: f32, mut v: f32) -> (f32, f32) {
        let twist = self.twist();
        let mut energy = p.distance_squared(self.position_at(u, v));
        for _ in 0..BILINEAR_MAX_ITERS {
            let residual = self.position_at(u, v) - p;
            let (pu, pv) = self.derivatives(u, v);
            let gu = pu.dot(residual);
            let gv = pv.dot(residual);
            let huu = pu.dot(pu);
            let hvv = pv.dot(pv);
            let huv_gn = pu.dot(pv);
            let huv = huv_gn + twist.dot(residual);

            let det = huu * hvv - huv * huv;
            let (du, dv) = if huu > 0.0 && det > 1.0e-12 {
                (-(hvv * gu - huv * gv) / det, -(huu * gv - huv * gu) / det)
            } else {
                let det_gn = huu * hvv - huv_gn * huv_gn;
                if det_gn.abs() <= 1.0e-12 {
                    break;
                }
                (
                    -(hvv * gu - huv_gn * gv) / det_gn,
                    -(huu * gv - huv_gn * gu) / det_gn,
                )
            };

            let mut step = 1.0;
            let mut moved = false;
            for _ in 0..BILINEAR_MAX_HALVINGS {
                let nu = (u + du * step).clamp(0.0, 1.0);
                let nv = (v + dv * step).clamp(0.0, 1.0);
                let next = p.distance_squared(self.position_at(nu, nv));
                if next <= energy {
                    moved = (nu - u).abs() + (nv - v).abs() >= BILINEAR_EPS;
                    u = nu;
                    v = nv;
                    energy = next;
                    break;
                }
                step *= 0.5;
            }
            if !moved {
                break;
            }
        }
        (u, v)
    }

    /// Nearest ray/patch intersection with `t >= 0`, as (t, u, v).
    pub fn intersect_ray(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32, f32)> {
        let [p0, p1, p2, p3] = self.points.map(|p| p.as_dvec3());
        let o = origin.as_dvec3();
        let d = dir.as_dvec3();
        let dir_len_sq = d.length_squared();
        if dir_len_sq <= 0.0 {
            return None;
        }
        // Two planes through the ray; a hit satisfies both plane equations.
        let (n1, n2) = (d / dir_len_sq.sqrt()).any_orthonormal_pair();
        let a = p0 - p1 + p2 - p3;
        let b = p1 - p0;
        let c = p3 - p0;
        let q = p0 - o;
        let (a1, b1, c1, d1) = (a.dot(n1), b.dot(n1), c.dot(n1), q.dot(n1));
        let (a2, b2, c2, d2) = (a.dot(n2), b.dot(n2), c.dot(n2), q.dot(n2));

        let size_sq = b.length_squared().max(c.length_squared()).max(1.0e-12);
        let mut best: Option<(f64, f64, f64)> = None;
        for v in solve_quadratic(
            c1 * a2 - c2 * a1,
            c1 * b2 + d1 * a2 - c2 * b1 - d2 * a1,
            d1 * b2 - d2 * b1,
        )
        .into_iter()
        .flatten()
        {
            if !(-RAY_UV_EPS..=1.0 + RAY_UV_EPS).contains(&v) {
                continue;
            }
            let v = v.clamp(0.0, 1.0);
            let den1 = a1 * v + b1;
            let den2 = a2 * v + b2;
            let u = if den1.abs() >= den2.abs() {
                -(c1 * v + d1) / den1
            } else {
                -(c2 * v + d2) / den2
            };
            if !u.is_finite() || !(-RAY_UV_EPS..=1.0 + RAY_UV_EPS).contains(&u) {
                continue;
            }
            let u = u.clamp(0.0, 1.0);
            let hit = a * (u * v) + b * u + c * v + p0;
            let t = (hit - o).dot(d) / dir_len_sq;
            if t < 0.0 || (o + d * t).distance_squared(hit) > RAY_RESIDUAL_EPS * size_sq {
                continue;
            }
            if !best.is_some_and(|(best_t, ..)| best_t <= t) {
                best = Some((t, u, v));
            }
        }
        best.map(|(t, u, v)| (t as f32, u as f32, v as f32))
    }
}

fn solve_quadratic(a: f64, b: f64, c: f64) -> [Option<f64>; 2] {
    let scale = a.abs().max(b.abs()).max(c.abs());
    if scale == 0.0 {
        return [None, None];
    }
    if a.abs() <= 1.0e-12 * scale {
        if b.abs() <= 1.0e-12 * scale {
            return [None, None];
        }
        return [Some(-c / b), None];
    }
    let mut disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        if disc < -1.0e-12 * scale * scale {
            return [None, None];
        }
        disc = 0.0;
    }
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    if q == 0.0 {
        return [Some(0.0), None];
    }
    [Some(q / a), Some(c / q)]
}

impl SurfacePrimitive for Primitive {
    fn position_at(&self, u: f32, v: f32) -> Vec3 {
        match self {
            Primitive::Triangle(tri) => tri.position_at(u, v),
            Primitive::Quad(quad) => quad.position_at(u, v),
        }
    }

    fn normal_at(&self, u: f32, v: f32) -> Vec3 {
        match self {
            Primitive::Triangle(tri) => tri.normal_at(u, v),
            Primitive::Quad(quad) => quad.normal_at(u, v),
        }
    }

    fn interpolation_weights_at(&self, u: f32, v: f32) -> VertexWeights {
        match self {
            Primitive::Triangle(tri) => tri.interpolation_weights_at(u, v),
            Primitive::Quad(quad) => quad.interpolation_weights_at(u, v),
        }
    }
}

impl Primitive {
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        match *points {
            [a, b, c] => Some(Primitive::Triangle(Triangle { points: [a, b, c] })),
            [a, b, c, d] => Some(Primitive::Quad(Quad {
                points: [a, b, c, d],
            })),
            _ => None,
        }
    }

    pub fn closest_point(&self, p: Vec3) -> ClosestPoint {
        match self {
            Primitive::Triangle(tri) => tri.closest_point(p),
            Primitive::Quad(quad) => quad.closest_point(p),
        }
    }

    /// Nearest intersection in front of `origin`, as (distance along `dir`, u, v).
    pub fn intersect_ray(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32, f32)> {
        let hit = match self {
            Primitive::Triangle(tri) => tri.intersect_ray(origin, dir),
            Primitive::Quad(quad) => quad.intersect_ray(origin, dir),
        }?;
        (hit.0 >= 0.0).then_some(hit)
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let points: &[Vec3] = match self {
            Primitive::Triangle(tri) => &tri.points,
            Primitive::Quad(quad) => &quad.points,
        };
        points.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        )
    }
}

fn ray_triangle_intersect(
    origin: Vec3,
    dir: Vec3,
    a: Vec3,
    b: Vec3,
    c: Vec3,
) -> Option<(f32, [f32; 3])> {
    let eps = 1.0e-8;
    let edge1 = b - a;
    let edge2 = c - a;
    let h = dir.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() < eps {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(h) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    Some((t, [1.0 - u - v, u, v]))
}

fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (Vec3, [f32; 3]) {
    let ab = b - a;
    let ac = c - a;
    let area = ab.cross(ac).length_squared();
    if area <= 1.0e-12 {
        let mut best = a;
        let mut bary = [1.0, 0.0, 0.0];
        let mut best_dist = (p - a).length_squared();
        let dist_b = (p - b).length_squared();
        if dist_b < best_dist {
            best = b;
            bary = [0.0, 1.0, 0.0];
            best_dist = dist_b;
        }
        let dist_c = (p - c).length_squared();
        if dist_c < best_dist {
            best = c;
            bary = [0.0, 0.0, 1.0];
        }
        return (best, bary);
    }
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, [1.0, 0.0, 0.0]);
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        let point = b + (c - b) * w;
        return (point, [0.0, 1.0 - w, w]);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    let u = 1.0 - v - w;
    let point = a + ab * v + ac * w;
    (point, [u, v, w])
}

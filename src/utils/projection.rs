//! Projected coordinate systems used for Taiwan maps.
//!
//! TWD97 and TWD67 both use a 2-degree transverse Mercator zone (TM2) centred
//! on 121°E, on the GRS80 and GRS67 ellipsoids respectively. The two grids are
//! related by a small affine shift.

/// A reference ellipsoid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in metres
    pub a: f64,
    /// Semi-minor axis in metres
    pub b: f64,
}

pub const GRS80: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.314_140_356,
};

pub const GRS67: Ellipsoid = Ellipsoid {
    a: 6_378_160.0,
    b: 6_356_774.719_2,
};

impl Ellipsoid {
    /// First eccentricity squared
    fn e2(&self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }
}

/// A transverse Mercator zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub ellipsoid: Ellipsoid,
    /// Central meridian in degrees
    pub lon0: f64,
    /// Scale factor on the central meridian
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

/// TWD97 TM2 zone 121
pub const TWD97_TM2: TransverseMercator = TransverseMercator {
    ellipsoid: GRS80,
    lon0: 121.0,
    k0: 0.9999,
    false_easting: 250_000.0,
    false_northing: 0.0,
};

/// TWD67 TM2 zone 121
pub const TWD67_TM2: TransverseMercator = TransverseMercator {
    ellipsoid: GRS67,
    lon0: 121.0,
    k0: 0.9999,
    false_easting: 250_000.0,
    false_northing: 0.0,
};

impl TransverseMercator {
    /// Latitude/longitude (degrees) to grid (x, y) in metres
    pub fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let Ellipsoid { a, b } = self.ellipsoid;
        let lat = lat.to_radians();
        let p = (lon - self.lon0).to_radians();

        let e2 = self.ellipsoid.e2();
        let ep2 = e2 / (1.0 - e2);
        let n = (a - b) / (a + b);
        let (sin, cos, tan) = (lat.sin(), lat.cos(), lat.tan());
        let nu = a / (1.0 - e2 * sin * sin).sqrt();

        // Meridional arc
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let aa = a * (1.0 - n + 5.0 / 4.0 * (n2 - n3) + 81.0 / 64.0 * (n4 - n5));
        let bb = 3.0 * a * n / 2.0 * (1.0 - n + 7.0 / 8.0 * (n2 - n3) + 55.0 / 64.0 * (n4 - n5));
        let cc = 15.0 * a * n2 / 16.0 * (1.0 - n + 3.0 / 4.0 * (n2 - n3));
        let dd = 35.0 * a * n3 / 48.0 * (1.0 - n + 11.0 / 16.0 * (n2 - n3));
        let ee = 315.0 * a * n4 / 512.0 * (1.0 - n);
        let s = aa * lat - bb * (2.0 * lat).sin() + cc * (4.0 * lat).sin() - dd * (6.0 * lat).sin()
            + ee * (8.0 * lat).sin();

        let k1 = s * self.k0;
        let k2 = self.k0 * nu * sin * cos / 2.0;
        let k3 = self.k0 * nu * sin * cos.powi(3) / 24.0
            * (5.0 - tan * tan + 9.0 * ep2 * cos * cos + 4.0 * ep2 * ep2 * cos.powi(4));
        let y = k1 + k2 * p * p + k3 * p.powi(4) + self.false_northing;

        let k4 = self.k0 * nu * cos;
        let k5 = self.k0 * nu * cos.powi(3) / 6.0 * (1.0 - tan * tan + ep2 * cos * cos);
        let x = k4 * p + k5 * p.powi(3) + self.false_easting;

        (x, y)
    }

    /// Grid (x, y) in metres to latitude/longitude (degrees)
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let a = self.ellipsoid.a;
        let x = x - self.false_easting;
        let y = y - self.false_northing;

        let e2 = self.ellipsoid.e2();
        let ep2 = e2 / (1.0 - e2);

        // Footprint latitude
        let m = y / self.k0;
        let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let j1 = 3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0;
        let j2 = 21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0;
        let j3 = 151.0 * e1.powi(3) / 96.0;
        let j4 = 1097.0 * e1.powi(4) / 512.0;
        let fp = mu
            + j1 * (2.0 * mu).sin()
            + j2 * (4.0 * mu).sin()
            + j3 * (6.0 * mu).sin()
            + j4 * (8.0 * mu).sin();

        let (sin, cos, tan) = (fp.sin(), fp.cos(), fp.tan());
        let c1 = ep2 * cos * cos;
        let t1 = tan * tan;
        let r1 = a * (1.0 - e2) / (1.0 - e2 * sin * sin).powf(1.5);
        let n1 = a / (1.0 - e2 * sin * sin).sqrt();
        let d = x / (n1 * self.k0);

        let q1 = n1 * tan / r1;
        let q2 = d * d / 2.0;
        let q3 = (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0;
        let q4 = (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 3.0 * c1 * c1 - 252.0 * ep2)
            * d.powi(6)
            / 720.0;
        let lat = fp - q1 * (q2 - q3 + q4);

        let q6 = (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0;
        let q7 = (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
            * d.powi(5)
            / 120.0;
        let lon = self.lon0.to_radians() + (d - q6 + q7) / cos;

        (lat.to_degrees(), lon.to_degrees())
    }
}

// Affine shift between the TWD67 and TWD97 TM2 grids
const SHIFT_A: f64 = 0.000_015_49;
const SHIFT_B: f64 = 0.000_006_521;
const SHIFT_DX: f64 = 807.8;
const SHIFT_DY: f64 = -248.6;

/// TWD67 TM2 grid to TWD97 TM2 grid
pub fn twd67_tm2_to_twd97_tm2(x67: f64, y67: f64) -> (f64, f64) {
    let x97 = x67 + SHIFT_DX + SHIFT_A * x67 + SHIFT_B * y67;
    let y97 = y67 + SHIFT_DY + SHIFT_A * y67 + SHIFT_B * x67;
    (x97, y97)
}

/// TWD97 TM2 grid to TWD67 TM2 grid
pub fn twd97_tm2_to_twd67_tm2(x97: f64, y97: f64) -> (f64, f64) {
    let x67 = x97 - SHIFT_DX - SHIFT_A * x97 - SHIFT_B * y97;
    let y67 = y97 - SHIFT_DY - SHIFT_A * y97 - SHIFT_B * x97;
    (x67, y67)
}

pub fn twd97_lat_lon_to_twd97_tm2(lat: f64, lon: f64) -> (f64, f64) {
    TWD97_TM2.forward(lat, lon)
}

pub fn twd97_tm2_to_twd97_lat_lon(x: f64, y: f64) -> (f64, f64) {
    TWD97_TM2.inverse(x, y)
}

pub fn twd97_lat_lon_to_twd67_tm2(lat: f64, lon: f64) -> (f64, f64) {
    let (x, y) = twd97_lat_lon_to_twd97_tm2(lat, lon);
    twd97_tm2_to_twd67_tm2(x, y)
}

pub fn twd67_tm2_to_twd97_lat_lon(x: f64, y: f64) -> (f64, f64) {
    let (x, y) = twd67_tm2_to_twd97_tm2(x, y);
    twd97_tm2_to_twd97_lat_lon(x, y)
}

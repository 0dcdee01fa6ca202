//! Common test fixtures for regridding tests.

/// Grid definitions used across tests.
pub mod grid {
    /// 4x4 cells of 0.1° straddling the equator.
    pub const EQUATOR_4X4: GridSpec = GridSpec {
        origin_lat: 0.2,
        origin_lon: 0.0,
        res_lat: 0.1,
        res_lon: 0.1,
        rows: 4,
        cols: 4,
    };

    /// 5° x 5° window over the Congo basin at 0.05°.
    pub const CONGO_5DEG: GridSpec = GridSpec {
        origin_lat: 5.0,
        origin_lon: 15.0,
        res_lat: 0.05,
        res_lon: 0.05,
        rows: 100,
        cols: 100,
    };

    /// Band touching the north pole at 0.5°.
    pub const ARCTIC_BAND: GridSpec = GridSpec {
        origin_lat: 90.0,
        origin_lon: -180.0,
        res_lat: 0.5,
        res_lon: 0.5,
        rows: 20,
        cols: 720,
    };

    /// Lat/lon grid definition: north-west origin, cell size and extent.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct GridSpec {
        pub origin_lat: f64,
        pub origin_lon: f64,
        pub res_lat: f64,
        pub res_lon: f64,
        pub rows: usize,
        pub cols: usize,
    }
}

/// Category codes loosely following common land-cover legends.
pub mod classes {
    pub const CROPLAND: i32 = 10;
    pub const FOREST: i32 = 50;
}

/// No-data sentinels seen in source products.
pub mod nodata {
    pub const FLOAT_FILL: f32 = -9999.0;
    pub const BYTE_FILL: f32 = 255.0;
}

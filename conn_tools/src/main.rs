/*
This file is part of the Connectivity Preprocessing Toolkit
Copyright (C) 2025 the Connectivity Preprocessing Toolkit authors

The Connectivity Preprocessing Toolkit is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
use anyhow::Result;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use structopt::StructOpt;

use crate::cmd_enrich_lulc::{enrich_lulc, EnrichLulcArgs};
use crate::cmd_fetch_osm::{fetch_osm, FetchOsmArgs};
use crate::cmd_impedance::{run_impedance, ImpedanceArgs};
use crate::cmd_protected_areas::{protected_areas, ProtectedAreasArgs};
use crate::cmd_reclassify::{reclassify, ReclassifyArgs};

mod cmd_enrich_lulc;
mod cmd_fetch_osm;
mod cmd_impedance;
mod cmd_protected_areas;
mod cmd_reclassify;
mod geojson_filter;
mod overpass;
mod pa_api;
mod stressors;

#[derive(StructOpt)]
struct Cli {

    #[structopt(long, default_value = "Info")]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    cmd: Command
}

#[derive(StructOpt)]
enum Command {
    #[structopt(help="Fetches OSM stressor themes from Overpass and merges them into one GeoPackage")]
    FetchOsm(FetchOsmArgs),

    #[structopt(help="Reprojects, repairs and buffers the input vectors, then rasterizes them onto the LULC grid")]
    EnrichLulc(EnrichLulcArgs),

    #[structopt(help="Fetches protected areas per country, rasterizes them per LULC year and sums them with the LULC rasters")]
    ProtectedAreas(ProtectedAreasArgs),

    #[structopt(help="Reclassifies LULC rasters into impedance rasters with the CSV table")]
    Reclassify(ReclassifyArgs),

    #[structopt(help="Builds the stressor registry, applies decay and accumulates edge effects into the impedance raster")]
    Impedance(ImpedanceArgs),
}

fn run() -> Result<()> {
    let args = Cli::from_args();

    SimpleLogger::new().with_level(args.log_level).init()?;

    match &args.cmd {
        Command::FetchOsm(r) => {
            fetch_osm(r)?;
        },
        Command::EnrichLulc(r) => {
            enrich_lulc(r)?;
        },
        Command::ProtectedAreas(r) => {
            protected_areas(r)?;
        },
        Command::Reclassify(r) => {
            reclassify(r)?;
        },
        Command::Impedance(r) => {
            run_impedance(r)?;
        },
    }

    Ok(())
}

fn main() {
    run().unwrap();
}

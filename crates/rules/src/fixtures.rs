//! Shared test graph: one building, one floor, two air handlers.
//!
//! AHU-1 has a single supply air sensor; AHU-2 has two, so any rule that
//! binds `[SupplyAirTemperatureSensor]` is ambiguous for AHU-2.

use twinwatch_graph::{GraphSnapshot, ModelDef, Twin};

pub const BUILDING: &str = "dtmi:com:test:Building;1";
pub const FLOOR: &str = "dtmi:com:test:Level;1";
pub const AHU: &str = "dtmi:com:test:AirHandlingUnit;1";
pub const SENSOR: &str = "dtmi:com:test:Sensor;1";
pub const TEMP_SENSOR: &str = "dtmi:com:test:TemperatureSensor;1";
pub const SUPPLY_TEMP: &str = "dtmi:com:test:SupplyAirTemperatureSensor;1";
pub const SETPOINT: &str = "dtmi:com:test:SupplyAirTemperatureSetpoint;1";
pub const FAN_STATUS: &str = "dtmi:com:test:FanRunSensor;1";

fn add(g: &mut GraphSnapshot, id: &str, model: &str) {
    g.upsert_twin(Twin {
        id: id.into(),
        model_id: model.into(),
        name: None,
        unit: None,
    });
}

pub fn building_graph() -> GraphSnapshot {
    let mut g = GraphSnapshot::new(7);
    g.add_model(ModelDef { id: SENSOR.into(), extends: vec![] });
    g.add_model(ModelDef { id: TEMP_SENSOR.into(), extends: vec![SENSOR.into()] });
    g.add_model(ModelDef { id: SUPPLY_TEMP.into(), extends: vec![TEMP_SENSOR.into()] });
    g.add_model(ModelDef { id: FAN_STATUS.into(), extends: vec![SENSOR.into()] });

    add(&mut g, "B1", BUILDING);
    add(&mut g, "L1", FLOOR);
    add(&mut g, "AHU-1", AHU);
    add(&mut g, "AHU-2", AHU);
    add(&mut g, "SAT-1", SUPPLY_TEMP);
    add(&mut g, "SAT-2a", SUPPLY_TEMP);
    add(&mut g, "SAT-2b", SUPPLY_TEMP);
    add(&mut g, "SP-1", SETPOINT);
    add(&mut g, "SP-2", SETPOINT);
    add(&mut g, "FAN-1", FAN_STATUS);

    g.add_relationship("L1", "B1", "isPartOf");
    g.add_relationship("AHU-1", "L1", "locatedIn");
    g.add_relationship("AHU-2", "L1", "locatedIn");
    g.add_relationship("SAT-1", "AHU-1", "isCapabilityOf");
    g.add_relationship("SAT-2a", "AHU-2", "isCapabilityOf");
    g.add_relationship("SAT-2b", "AHU-2", "isCapabilityOf");
    g.add_relationship("SP-1", "AHU-1", "isCapabilityOf");
    g.add_relationship("SP-2", "AHU-2", "isCapabilityOf");
    g.add_relationship("FAN-1", "AHU-1", "isCapabilityOf");
    g
}

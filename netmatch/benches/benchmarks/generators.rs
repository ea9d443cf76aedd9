use netmatch::netlist::{Module, PortDirection, SigSpec};

fn port(module: &mut Module, name: &str, width: usize, direction: PortDirection) -> SigSpec {
    SigSpec::from_wire(module.add_port(name, width, direction), width)
}

fn binary(module: &mut Module, name: &str, kind: &str, a: &SigSpec, b: &SigSpec, y: &SigSpec) {
    let id = module.add_cell(name, kind);
    let cell = &mut module[id];
    cell.set_port("A", a.clone());
    cell.set_port("B", b.clone());
    cell.set_port("Y", y.clone());
    cell.set_param("A_SIGNED", false);
    cell.set_param("B_SIGNED", false);
}

/// Create a module with `n` multiply-add stages.
///
/// Each stage computes `y_i = a_i * b_i + c_i` with 8-bit operands. Every
/// other stage also registers its operands on a shared clock, so that the
/// register subpatterns are exercised.
pub fn make_mul_add_stages(n: usize) -> Module {
    let mut module = Module::new("stages");
    let clk = port(&mut module, "clk", 1, PortDirection::Input);
    for i in 0..n {
        let mut a = port(&mut module, &format!("a{i}"), 8, PortDirection::Input);
        let b = port(&mut module, &format!("b{i}"), 8, PortDirection::Input);
        let c = port(&mut module, &format!("c{i}"), 16, PortDirection::Input);
        let y = port(&mut module, &format!("y{i}"), 17, PortDirection::Output);
        if i % 2 == 1 {
            let q = SigSpec::from_wire(module.add_wire(format!("a{i}_q"), 8), 8);
            let ff = module.add_cell(format!("ff{i}"), "$dff");
            let cell = &mut module[ff];
            cell.set_port("CLK", clk.clone());
            cell.set_port("D", a.clone());
            cell.set_port("Q", q.clone());
            cell.set_param("CLK_POLARITY", true);
            a = q;
        }
        let p = SigSpec::from_wire(module.add_wire(format!("p{i}"), 16), 16);
        binary(&mut module, &format!("mul{i}"), "$mul", &a, &b, &p);
        binary(&mut module, &format!("add{i}"), "$add", &p, &c, &y);
    }
    module
}

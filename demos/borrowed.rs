use tabp::{new_root_environment, Table, TabpError, Value};

// Builds call forms directly instead of parsing them, and extends the
// environment with a host function.
fn main() {
    let environment = new_root_environment();
    environment.define_function("LEN", |_env, args| match args.get_int(1) {
        Value::String(text) => Value::Int(text.chars().count() as i64),
        Value::Table(table) => Value::Int(table.borrow().len() as i64),
        _ => Value::error(TabpError::Raised("LEN needs a string or a table".to_owned())),
    });

    let mut shopping = Table::new();
    shopping.append(Value::string("eggs"));
    shopping.append(Value::string("spam"));
    shopping.set(Value::symbol("shop"), Value::string("corner"));

    let quoted: Table = [Value::symbol("QUOTE"), Value::table(shopping)].into_iter().collect();
    let forms = vec![
        [Value::symbol("LEN"), Value::table(quoted)].into_iter().collect::<Table>(),
        [Value::symbol("LEN"), Value::string("tabp")].into_iter().collect(),
        [Value::symbol("LEN"), Value::Int(1)].into_iter().collect(),
    ];

    for form in forms {
        let form = Value::table(form);
        println!("{}: {}", form, environment.eval(&form));
    }
}

use std::{cell::RefCell, path::Path, rc::Rc};

use painter_script::{native, Ast, Globals, Machine, Step, Value};

#[derive(Default, Clone)]
pub struct TestCase {
    input: String,
    expected: String,
}

fn exec_one(s: &str) -> Result<Vec<String>, String> {
    let ast = Ast::parse(s).map_err(|e| format!("parse {}:{} {}", e.line, e.column, e.message))?;
    let printed = Rc::new(RefCell::new(Vec::new()));
    let mut globals = Globals::standard();
    let sink = printed.clone();
    globals.function(native::function("print", move |args: &[Value]| {
        let words: Vec<String> = args.iter().map(Value::to_string).collect();
        sink.borrow_mut().push(words.join(" "));
        Ok(Value::Undefined)
    }));

    let mut machine = Machine::new(Rc::new(ast), &globals);
    loop {
        match machine.step() {
            Ok(Step::Paused(_)) => {}
            Ok(Step::Done) => break,
            Ok(Step::Suspended) => return Err("suspended".to_owned()),
            Err(fault) => return Err(format!("fault {}", fault.message)),
        }
    }
    let ret = printed.borrow().clone();
    Ok(ret)
}

impl TestCase {
    fn exec(&self) {
        let printed = exec_one(&self.input).unwrap();
        let expected: Vec<String> = self.expected.lines().map(|l| l.trim().to_owned()).collect();
        pretty_assertions::assert_eq!(printed, expected, "program:\n{}", self.input);
    }

    fn exec_failure(&self) {
        let err = exec_one(&self.input).unwrap_err();
        pretty_assertions::assert_eq!(err, self.expected.trim(), "program:\n{}", self.input);
    }
}

pub fn read_tests(path: impl AsRef<Path>) -> Vec<TestCase> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut ret = Vec::new();
    let mut in_input = true;
    let mut cur = TestCase::default();

    fn separator_line(line: &str, ch: u8) -> bool {
        line.trim().len() >= 2 && line.trim().bytes().all(|c| c == ch)
    }

    for line in text.split_inclusive('\n') {
        if in_input {
            if separator_line(line, b'-') {
                in_input = false;
            } else {
                cur.input += line;
            }
        } else if separator_line(line, b'=') {
            in_input = true;
            ret.push(std::mem::take(&mut cur));
        } else {
            cur.expected += line;
        }
    }
    ret
}

#[test]
fn programs() {
    let tests = read_tests("tests/programs.txt");
    assert!(!tests.is_empty());
    for test in tests {
        test.exec();
    }
}

#[test]
fn failures() {
    let tests = read_tests("tests/failures.txt");
    assert!(!tests.is_empty());
    for test in tests {
        test.exec_failure();
    }
}

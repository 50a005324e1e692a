#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;
extern crate strum;
#[macro_use] extern crate strum_macros;

mod bytecode;
mod errors;
mod machine;
mod unit;

use std::env;
use std::fs;

use crate::bytecode::{assemble, read_program_file, write_program_file, Program};
use crate::machine::Machine;

fn main() {
  let arguments: Vec<String> = env::args().collect();

  if arguments.len() < 2 {
    println!("Usage: canvas <source> [run|compile]");
    println!("       canvas <program.bc>");
    return;
  }

  let path = arguments[1].as_str();

  // A bytecode file bypasses the assembler entirely.
  if path.ends_with(".bc") {
    match read_program_file(path) {
      Ok(program) => execute(&program),
      Err(error)  => println!("{}", error),
    }
    return;
  }

  let text = match fs::read_to_string(path) {
    Ok(text) => text,
    Err(_) => {
      println!("Invalid assembly file");
      return;
    }
  };

  // Any assembly error aborts before execution; a partial program never runs.
  let program = match assemble(&text) {
    Ok(program) => program,
    Err(error) => {
      println!("{}", error);
      return;
    }
  };

  match arguments.get(2).map(String::as_str) {

    None | Some("run") => {
      execute(&program);
    }

    Some("compile") => {
      let out_path = format!("{}.bc", path);
      if let Err(error) = write_program_file(&program, &out_path) {
        println!("Error occurred while writing bytecodes: {}", error);
      }
    }

    Some(mode) => {
      println!("Unknown mode: {}", mode);
    }

  }
}

fn execute(program: &Program) {
  let mut machine = Machine::new();
  if let Err(error) = machine.run(program) {
    println!("{}", error);
  }
}
